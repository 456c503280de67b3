//! Command line argument definitions and dispatch.

use std::ffi::OsString;
use std::io::{Read, Write};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use fn_error_context::context;
use kargs::Kargs;

/// Where the running kernel exposes its command line.
const PROC_CMDLINE: &str = "/proc/cmdline";

/// Inspect and edit a kernel command line.
///
/// Edits are never written back; the resulting command line is printed
/// to stdout.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "kargs", version)]
pub(crate) struct Opt {
    /// Operate on this command line instead of reading one.
    ///
    /// Takes precedence over --file.
    #[clap(long, global = true)]
    pub(crate) cmdline: Option<String>,

    /// Read the command line from this file; `-` reads stdin
    #[clap(
        long,
        global = true,
        env = "KARGS_CMDLINE_FILE",
        default_value = PROC_CMDLINE
    )]
    pub(crate) file: Utf8PathBuf,

    #[clap(subcommand)]
    pub(crate) cmd: Cmd,
}

/// Operations on a parsed command line.
#[derive(Debug, clap::Subcommand, PartialEq, Eq)]
pub(crate) enum Cmd {
    /// Print the command line
    Show,

    /// Print whether a key is present, with or without a value
    Contains {
        /// The key; `-` and `_` are interchangeable
        key: String,
    },

    /// Print every value of a key, one per line
    ///
    /// A key given without `=` has a single empty value.
    Get {
        /// The key; `-` and `_` are interchangeable
        key: String,

        /// Print the values as a JSON array
        #[clap(long)]
        json: bool,
    },

    /// Set a key, replacing all of its values, and print the result
    Set {
        /// The key to set
        key: String,

        /// The new value; omit it for a key-only switch
        #[clap(default_value = "")]
        value: String,
    },

    /// Remove a key, or one of its values, and print the result
    Delete {
        /// The key to remove
        key: String,

        /// Only remove the first occurrence with this value
        #[clap(long)]
        value: Option<String>,
    },

    /// Print the parameters of a kernel module, as passed to a module loader
    ModuleFlags {
        /// The module name
        name: String,
    },
}

/// Read the command line selected by the options.
#[context("Loading kernel command line")]
fn load(opts: &Opt) -> Result<Kargs> {
    if let Some(cmdline) = opts.cmdline.as_deref() {
        tracing::debug!("Using command line from arguments");
        return Ok(Kargs::parse(cmdline));
    }

    tracing::debug!("Reading command line from {}", opts.file);
    if opts.file == PROC_CMDLINE {
        return Kargs::from_proc();
    }
    let buf = if opts.file == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Reading stdin")?;
        buf
    } else {
        std::fs::read(&opts.file).with_context(|| format!("Reading {}", opts.file))?
    };
    // Files conventionally end in a newline, which isn't an argument
    Ok(Kargs::parse(buf.trim_ascii_end()))
}

/// Parse the provided arguments and execute, writing results to `out`.
pub(crate) fn run_from_iter<I, W>(args: I, out: &mut W) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    W: Write,
{
    run(Opt::parse_from(args), out)
}

fn run<W: Write>(opts: Opt, out: &mut W) -> Result<()> {
    let mut cmdline = load(&opts)?;
    match opts.cmd {
        Cmd::Show => writeln!(out, "{cmdline}")?,
        Cmd::Contains { key } => writeln!(out, "{}", cmdline.contains(&key))?,
        Cmd::Get { key, json } => {
            let values = cmdline
                .get(&key)
                .ok_or_else(|| kargs::Error::NotExists(key.clone()))?;
            if json {
                serde_json::to_writer(&mut *out, &values)?;
                writeln!(out)?;
            } else {
                for value in values {
                    writeln!(out, "{value}")?;
                }
            }
        }
        Cmd::Set { key, value } => {
            cmdline
                .set(&key, &value)
                .with_context(|| format!("Setting {key}"))?;
            writeln!(out, "{cmdline}")?;
        }
        Cmd::Delete { key, value: None } => {
            cmdline
                .delete(&key)
                .with_context(|| format!("Deleting {key}"))?;
            writeln!(out, "{cmdline}")?;
        }
        Cmd::Delete {
            key,
            value: Some(value),
        } => {
            cmdline
                .delete_by_value(&key, &value)
                .with_context(|| format!("Deleting {key}={value}"))?;
            writeln!(out, "{cmdline}")?;
        }
        Cmd::ModuleFlags { name } => writeln!(out, "{}", cmdline.flags_for_module(&name))?,
    }
    Ok(())
}
