//! An ordered, editable kernel command line.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use fn_error_context::context;
use serde::{Deserialize, Serialize};

use crate::parse::{canonicalize_key, check_key, dequote, enquote, Token, Tokens};
use crate::Error;

/// A single kernel command line argument.
///
/// The canonical key is always derived from `key`, so two arguments whose
/// keys differ only in `-` versus `_` look up the same way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Karg {
    raw: String,
    key: String,
    canonical_key: String,
    value: String,
}

impl Karg {
    fn new(raw: String, key: String, value: String) -> Self {
        let canonical_key = canonicalize_key(&key).into_owned();
        Self {
            raw,
            key,
            canonical_key,
            value,
        }
    }

    /// The argument text as it will be written out
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The key as written, dashes and all
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The key with dashes replaced by underscores
    pub fn canonical_key(&self) -> &str {
        &self.canonical_key
    }

    /// The dequoted value; empty for a key-only switch
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<Token<'_>> for Karg {
    fn from(token: Token<'_>) -> Self {
        Self {
            raw: token.raw.to_owned(),
            key: token.key.to_owned(),
            value: token.trimmed_value().into_owned(),
            canonical_key: token.canonical_key.into_owned(),
        }
    }
}

impl fmt::Display for Karg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A parsed kernel command line.
///
/// Arguments keep their command line order. Each canonical key maps to the
/// positions of its occurrences, so a key may appear any number of times
/// (e.g. several `console=` arguments) and lookups don't scan the whole
/// line.
///
/// Writing the command line back out with [`ToString::to_string`] joins
/// every argument's original text with single spaces; arguments that were
/// never modified come out exactly as they were read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Kargs {
    args: Vec<Karg>,
    /// Canonical key to positions in `args`, in ascending order. A key
    /// with no occurrences has no entry.
    index: HashMap<String, Vec<usize>>,
}

/// An iterator over the arguments of a [`Kargs`].
///
/// This is created by the `iter` method on `Kargs`.
#[derive(Debug)]
pub struct KargsIter<'a>(std::slice::Iter<'a, Karg>);

impl<'a> Iterator for KargsIter<'a> {
    type Item = &'a Karg;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl Kargs {
    /// Creates a new empty command line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw command line.
    ///
    /// This never fails: invalid UTF-8 is replaced with U+FFFD and
    /// malformed quoting is kept as written.
    pub fn parse(raw: impl AsRef<[u8]>) -> Self {
        let input = String::from_utf8_lossy(raw.as_ref());
        Self::from_args(Tokens::new(&input).map(Karg::from).collect())
    }

    /// Reads the kernel command line from `/proc/cmdline`.
    #[context("Reading /proc/cmdline")]
    pub fn from_proc() -> Result<Self> {
        let cmdline = std::fs::read("/proc/cmdline")?;
        Ok(Self::parse(cmdline.trim_ascii_end()))
    }

    fn from_args(args: Vec<Karg>) -> Self {
        let mut kargs = Self {
            args,
            index: HashMap::new(),
        };
        kargs.reindex();
        kargs
    }

    /// Rebuild the key index from the argument order.
    ///
    /// Positions shift whenever an argument is inserted or removed, so
    /// every structural change ends here.
    fn reindex(&mut self) {
        self.index.clear();
        for (i, karg) in self.args.iter().enumerate() {
            self.index
                .entry(karg.canonical_key.clone())
                .or_default()
                .push(i);
        }
    }

    fn positions(&self, key: &str) -> Option<&[usize]> {
        self.index
            .get(&*canonicalize_key(key))
            .map(Vec::as_slice)
    }

    /// The number of arguments, counting every occurrence of a key.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns an iterator over all arguments in command line order.
    pub fn iter(&self) -> KargsIter<'_> {
        KargsIter(self.args.iter())
    }

    /// Whether the key is present, with or without a value.
    pub fn contains(&self, key: &str) -> bool {
        self.positions(key).is_some()
    }

    /// All values of a key, in command line order.
    ///
    /// Returns `None` if the key is absent. A key-only switch is present
    /// with an empty value, so `quiet` yields `Some(vec![""])`.
    pub fn get(&self, key: &str) -> Option<Vec<&str>> {
        let positions = self.positions(key)?;
        Some(
            positions
                .iter()
                .map(|&i| self.args[i].value.as_str())
                .collect(),
        )
    }

    /// Locate the value of the first occurrence of a key.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        let &first = self.positions(key)?.first()?;
        Some(self.args[first].value.as_str())
    }

    /// Find the value of the key, which must be present.
    ///
    /// Otherwise the same as [`Self::value_of`].
    pub fn require_value_of(&self, key: &str) -> Result<&str, Error> {
        self.value_of(key)
            .ok_or_else(|| Error::NotExists(key.to_owned()))
    }

    /// Set a key to a value, adding it if needed.
    ///
    /// If the key is already present, its first occurrence is replaced in
    /// place and every later occurrence is removed. Otherwise the argument
    /// is appended. An empty value produces a key-only switch. Values
    /// containing spaces are quoted on output.
    ///
    /// Returns [`Error::InvalidKey`] if the key contains whitespace.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        check_key(key)?;

        let key = enquote(key);
        let raw = if value.is_empty() {
            key.to_string()
        } else {
            format!("{key}={}", enquote(value))
        };
        let new = Karg::new(raw, key.into_owned(), dequote(value).into_owned());
        let canonical_key = new.canonical_key.clone();

        // Build the whole new argument list before replacing the old one.
        let before = self.args.len();
        let mut pending = Some(new);
        let mut args: Vec<Karg> = std::mem::take(&mut self.args)
            .into_iter()
            .filter_map(|karg| {
                if karg.canonical_key == canonical_key {
                    pending.take()
                } else {
                    Some(karg)
                }
            })
            .collect();
        if let Some(new) = pending {
            args.push(new);
        }
        self.args = args;
        self.reindex();

        tracing::trace!(
            key = %canonical_key,
            replaced = (before + 1).saturating_sub(self.args.len()),
            "Set kernel argument"
        );
        Ok(())
    }

    /// Remove every occurrence of a key.
    ///
    /// Returns [`Error::NotExists`] if the key is absent.
    pub fn delete(&mut self, key: &str) -> Result<(), Error> {
        let canonical_key = canonicalize_key(key);
        let Some(positions) = self.index.remove(&*canonical_key) else {
            return Err(Error::NotExists(key.to_owned()));
        };

        self.args.retain(|karg| karg.canonical_key != canonical_key);
        self.reindex();

        tracing::trace!(key = %canonical_key, removed = positions.len(), "Deleted kernel argument");
        Ok(())
    }

    /// Remove the first occurrence of a key having exactly this value.
    ///
    /// The value is compared against the dequoted value of each
    /// occurrence. Returns [`Error::NotExists`] if the key is absent or
    /// none of its occurrences has the value; nothing is removed then.
    pub fn delete_by_value(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let positions = self
            .positions(key)
            .ok_or_else(|| Error::NotExists(key.to_owned()))?;
        let found = positions
            .iter()
            .copied()
            .find(|&i| self.args[i].value == value)
            .ok_or_else(|| Error::NotExists(format!("{key}={value}")))?;

        let removed = self.args.remove(found);
        self.reindex();

        tracing::trace!(key = %removed.canonical_key, value, "Deleted kernel argument value");
        Ok(())
    }

    /// The arguments of a kernel module, formatted for a module loader.
    ///
    /// Module parameters appear on the command line as `module.flag` or
    /// `module.flag=value`. This returns the matching flags with the module
    /// prefix removed, space separated, as `flag` or `flag=value`. Module
    /// and flag names are canonicalized, and only the first occurrence of
    /// each flag is used. Returns an empty string if there are none.
    pub fn flags_for_module(&self, name: &str) -> String {
        let prefix = format!("{}.", canonicalize_key(name));
        let mut seen = HashSet::new();
        let mut flags = Vec::new();
        for karg in &self.args {
            let Some(flag) = karg.canonical_key.strip_prefix(&prefix) else {
                continue;
            };
            if !seen.insert(karg.canonical_key.as_str()) {
                continue;
            }
            if karg.value.is_empty() {
                flags.push(flag.to_owned());
            } else {
                flags.push(format!("{flag}={}", karg.value));
            }
        }
        flags.join(" ")
    }
}

impl fmt::Display for Kargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args = self.args.iter();
        if let Some(first) = args.next() {
            f.write_str(&first.raw)?;
        }
        for karg in args {
            write!(f, " {}", karg.raw)?;
        }
        Ok(())
    }
}

impl FromStr for Kargs {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Kargs {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl From<String> for Kargs {
    fn from(input: String) -> Self {
        Self::parse(input)
    }
}

impl From<Vec<u8>> for Kargs {
    fn from(input: Vec<u8>) -> Self {
        Self::parse(input)
    }
}

impl From<Kargs> for String {
    fn from(kargs: Kargs) -> Self {
        kargs.to_string()
    }
}

impl<'a> IntoIterator for &'a Kargs {
    type Item = &'a Karg;
    type IntoIter = KargsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
