//! The main entrypoint for kargs, which just performs global initialization,
//! and then runs the command line.

mod cli;

use anyhow::Result;

fn run() -> Result<()> {
    kargs_utils::initialize_tracing();
    tracing::trace!("starting {}", env!("CARGO_PKG_NAME"));
    let stdout = std::io::stdout();
    cli::run_from_iter(std::env::args_os(), &mut stdout.lock())
}

fn main() {
    kargs_utils::run_main(run)
}
