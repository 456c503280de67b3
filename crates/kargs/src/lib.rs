//! Kernel command line tokenizing and editing.
//!
//! This crate parses a kernel command line into an ordered, mutable
//! collection of arguments. Arguments are either key-only switches or
//! `key=value` pairs, and quoted values may contain whitespace.
//!
//! Lookups treat `-` and `_` in keys as equivalent, as the kernel does,
//! but the original spelling of every untouched argument is kept so that
//! writing the command line back out reproduces the input.
//!
//! ```
//! let mut kargs = kargs::Kargs::parse("quiet console=tty0 console=ttyS0,115200n8");
//! assert_eq!(kargs.get("console"), Some(vec!["tty0", "ttyS0,115200n8"]));
//!
//! kargs.set("console", "ttyS1").unwrap();
//! assert_eq!(kargs.to_string(), "quiet console=ttyS1");
//! ```

mod error;
mod kargs;
mod parse;

pub use error::Error;
pub use kargs::{Karg, Kargs, KargsIter};
pub use parse::{canonicalize_key, dequote, enquote};
