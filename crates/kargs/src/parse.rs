//! Tokenizing a command line into individual arguments.
//!
//! Splitting honors quoting: whitespace inside a quoted span does not end
//! the argument. Each argument is then split on its first `=` into a key
//! and a value, and the value has one layer of outer quoting removed.

use std::borrow::Cow;

use crate::Error;

/// Characters a key may not contain when it is set programmatically.
const INVALID_KEY_CHARS: &[char] = &[' ', '\n', '\t'];

/// Kernel parameter names treat `-` and `_` as the same character.
///
/// Returns the key with every `-` replaced by `_`, borrowing the input
/// when there is nothing to replace.
pub fn canonicalize_key(key: &str) -> Cow<'_, str> {
    if key.contains('-') {
        Cow::Owned(key.replace('-', "_"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Reject keys which would not survive being split again.
pub(crate) fn check_key(key: &str) -> Result<(), Error> {
    if key.contains(INVALID_KEY_CHARS) {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Whether `c` opens a quoted span while splitting.
///
/// This is the Unicode `Quotation_Mark` property.
fn is_quotation_mark(c: char) -> bool {
    matches!(
        c,
        '\u{0022}'
            | '\u{0027}'
            | '\u{00AB}'
            | '\u{00BB}'
            | '\u{2018}'..='\u{201F}'
            | '\u{2039}'
            | '\u{203A}'
            | '\u{2E42}'
            | '\u{300C}'..='\u{300F}'
            | '\u{301D}'..='\u{301F}'
            | '\u{FE41}'..='\u{FE44}'
            | '\u{FF02}'
            | '\u{FF07}'
            | '\u{FF62}'
            | '\u{FF63}'
    )
}

/// Remove one layer of outer `"` or `'` quoting from a value.
///
/// Only a value whose first and last characters are the same quote is
/// touched; anything else, including a value with an opening quote but no
/// closing one, is returned as is. Inside the stripped value a backslash
/// directly before the quote character makes that quote literal, and one
/// level of backslash is dropped from the output. Other backslashes are
/// kept verbatim.
pub fn dequote(value: &str) -> Cow<'_, str> {
    let mut chars = value.chars();
    let quote = match chars.next() {
        Some(c @ ('"' | '\'')) => c,
        _ => return Cow::Borrowed(value),
    };
    let Some(inner) = chars.as_str().strip_suffix(quote) else {
        return Cow::Borrowed(value);
    };

    // Pending backslashes and unescaped inner quotes, innermost last.
    let mut context: Vec<char> = Vec::new();
    let mut out = String::with_capacity(inner.len());
    for c in inner.chars() {
        if c == '\\' {
            context.push(c);
        } else if c == quote {
            match context.last() {
                Some(&last) if last == quote => {
                    context.pop();
                }
                Some(_) => {
                    // Escaped quote, the backslash was already emitted.
                    out.pop();
                    context.clear();
                }
                None => context.push(c),
            }
        } else if context.last() == Some(&'\\') {
            context.clear();
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Quote a string so that it stays a single argument.
///
/// Strings without a space are returned unchanged, as are strings already
/// wrapped in a matching pair of `"` or `'`. Everything else is wrapped in
/// double quotes with `"`, `\` and control characters backslash-escaped.
pub fn enquote(s: &str) -> Cow<'_, str> {
    if !s.contains(' ') || is_outer_quoted(s) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0B}' => out.push_str("\\v"),
            c if c.is_control() && c.is_ascii() => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    Cow::Owned(out)
}

fn is_outer_quoted(s: &str) -> bool {
    let mut chars = s.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => first == last && matches!(first, '"' | '\''),
        _ => false,
    }
}

/// A single whitespace-delimited argument, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    /// The argument exactly as it appeared in the input
    pub(crate) raw: &'a str,
    /// Everything before the first `=`, or the whole argument
    pub(crate) key: &'a str,
    /// The key with dashes replaced by underscores
    pub(crate) canonical_key: Cow<'a, str>,
    /// Everything after the first `=`, still quoted
    pub(crate) value: &'a str,
}

impl<'a> Token<'a> {
    /// Attempt to parse a single token from the start of `input`.
    ///
    /// The first tuple item is `None` when the input is empty or only
    /// whitespace. The unconsumed remainder of the input is returned as
    /// the second tuple item.
    pub(crate) fn parse(input: &'a str) -> (Option<Self>, &'a str) {
        let input = input.trim_start();

        if input.is_empty() {
            return (None, input);
        }

        // A span opened by a quotation mark only ends at the same mark.
        let mut quote: Option<char> = None;
        let end = input
            .char_indices()
            .find_map(|(i, c)| match quote {
                Some(q) if c == q => {
                    quote = None;
                    None
                }
                Some(_) => None,
                None if is_quotation_mark(c) => {
                    quote = Some(c);
                    None
                }
                None => c.is_whitespace().then_some(i),
            })
            .unwrap_or(input.len());

        let (raw, rest) = input.split_at(end);
        let (key, value) = raw.split_once('=').unwrap_or((raw, ""));

        let token = Self {
            raw,
            key,
            canonical_key: canonicalize_key(key),
            value,
        };
        (Some(token), rest)
    }

    /// The value with its outer quoting removed
    pub(crate) fn trimmed_value(&self) -> Cow<'a, str> {
        dequote(self.value)
    }
}

/// An iterator over the tokens of a command line, in input order.
#[derive(Debug)]
pub(crate) struct Tokens<'a>(&'a str);

impl<'a> Tokens<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self(input)
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (token, rest) = Token::parse(self.0);
        self.0 = rest;
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // convenience method for tests
    fn token(s: &str) -> Token<'_> {
        Token::parse(s).0.unwrap()
    }

    #[test]
    fn test_canonicalize_key() {
        assert_eq!(canonicalize_key("with-hyphens"), "with_hyphens");
        assert_eq!(canonicalize_key("with_underscores"), "with_underscores");
        assert_eq!(canonicalize_key("mixed-and_both"), "mixed_and_both");
        assert!(matches!(canonicalize_key("nodash"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_check_key() {
        assert!(check_key("console").is_ok());
        assert!(check_key("rd.break").is_ok());
        for bad in ["with space", "with\ttab", "with\nnewline"] {
            assert_eq!(check_key(bad), Err(Error::InvalidKey(bad.to_owned())));
        }
    }

    #[test]
    fn test_dequote() {
        let checks = [
            (r#"no quotes"#, r#"no quotes"#),
            (r#""ended double quotes""#, r#"ended double quotes"#),
            (r#"'ended single quotes'"#, r#"ended single quotes"#),
            (
                r#"\"escaped ended double quotes\""#,
                r#"\"escaped ended double quotes\""#,
            ),
            (
                r#"\'escaped ended single quotes\'"#,
                r#"\'escaped ended single quotes\'"#,
            ),
            (r#"o"bscure double quotes""#, r#"o"bscure double quotes""#),
            (r#"o'bscure single quotes'"#, r#"o'bscure single quotes'"#),
            ("", ""),
        ];
        for (input, want) in checks {
            assert_eq!(dequote(input), want, "dequoting {input}");
        }
    }

    #[test]
    fn test_dequote_inner_escapes() {
        // an escaped inner quote loses one backslash
        assert_eq!(dequote(r#""say \"hi\" twice""#), r#"say "hi" twice"#);
        // other escapes are left alone
        assert_eq!(dequote(r#""C:\path\to""#), r#"C:\path\to"#);
        // the other quote character is never special
        assert_eq!(dequote(r#""it's""#), "it's");
        assert_eq!(dequote(r#"'a \'b\' c'"#), "a 'b' c");
    }

    #[test]
    fn test_dequote_malformed() {
        // no closing quote: nothing is stripped
        assert_eq!(dequote(r#""unclosed quotes"#), r#""unclosed quotes"#);
        assert_eq!(dequote(r#""mismatched'"#), r#""mismatched'"#);
        // a lone quote is not a pair
        assert_eq!(dequote(r#"""#), r#"""#);
        assert_eq!(dequote(r#""""#), "");
    }

    #[test]
    fn test_enquote() {
        let checks = [
            (r#"no-spaces-no-quotes"#, r#"no-spaces-no-quotes"#),
            (
                r#""no-spaces-double-end-quotes""#,
                r#""no-spaces-double-end-quotes""#,
            ),
            (
                r#"'no-spaces-single-end-quotes'"#,
                r#"'no-spaces-single-end-quotes'"#,
            ),
            (r#"spaces no quotes"#, r#""spaces no quotes""#),
            (r#""spaces double end quotes""#, r#""spaces double end quotes""#),
            (r#"'spaces single end quotes'"#, r#"'spaces single end quotes'"#),
            (
                r#"spaces" obscure double quotes""#,
                r#""spaces\" obscure double quotes\"""#,
            ),
            (
                r#"spaces' obscure single quotes'"#,
                r#""spaces' obscure single quotes'""#,
            ),
            ("", ""),
        ];
        for (input, want) in checks {
            assert_eq!(enquote(input), want, "enquoting {input}");
        }
    }

    #[test]
    fn test_enquote_escapes() {
        assert_eq!(enquote(r"a b\c"), r#""a b\\c""#);
        assert_eq!(enquote("a b\tc"), r#""a b\tc""#);
        assert_eq!(enquote("a b\u{1}"), r#""a b\x01""#);
        // mismatched outer quotes are not a wrapping pair
        assert_eq!(enquote(r#""a b'"#), r#""\"a b'""#);
        // quoting a value makes dequote give it back
        let value = r#"has "inner" quotes"#;
        assert_eq!(dequote(&enquote(value)), value);
    }

    #[test]
    fn test_token_parse() {
        let (t, rest) = Token::parse("foo");
        let t = t.unwrap();
        assert_eq!(t.raw, "foo");
        assert_eq!(t.key, "foo");
        assert_eq!(t.value, "");
        assert_eq!(rest, "");

        // should consume one token and return the rest of the input
        let (t, rest) = Token::parse("foo=bar baz");
        let t = t.unwrap();
        assert_eq!(t.key, "foo");
        assert_eq!(t.value, "bar");
        assert_eq!(rest, " baz");

        // should return None on empty or whitespace inputs
        let (t, rest) = Token::parse("");
        assert!(t.is_none());
        assert_eq!(rest, "");
        let (t, rest) = Token::parse(" \t\n ");
        assert!(t.is_none());
        assert_eq!(rest, "");
    }

    #[test]
    fn test_token_split_on_first_equals() {
        let t = token("root=live:https://example.tld/image.squashfs?a=b");
        assert_eq!(t.key, "root");
        assert_eq!(t.value, "live:https://example.tld/image.squashfs?a=b");

        let t = token("empty=");
        assert_eq!(t.key, "empty");
        assert_eq!(t.value, "");
    }

    #[test]
    fn test_tokens() {
        let input = r#"noval dup=val1 dup=val2 nondup=val with-dashes with-dashes-val=val "key quotes" \"key escaped quotes\" vq="value quotes" veq=\"value escaped quotes\""#;
        // raw, key, canonical key, value, trimmed value
        let expected = [
            ("noval", "noval", "noval", "", ""),
            ("dup=val1", "dup", "dup", "val1", "val1"),
            ("dup=val2", "dup", "dup", "val2", "val2"),
            ("nondup=val", "nondup", "nondup", "val", "val"),
            ("with-dashes", "with-dashes", "with_dashes", "", ""),
            (
                "with-dashes-val=val",
                "with-dashes-val",
                "with_dashes_val",
                "val",
                "val",
            ),
            (
                r#""key quotes""#,
                r#""key quotes""#,
                r#""key quotes""#,
                "",
                "",
            ),
            (
                r#"\"key escaped quotes\""#,
                r#"\"key escaped quotes\""#,
                r#"\"key escaped quotes\""#,
                "",
                "",
            ),
            (
                r#"vq="value quotes""#,
                "vq",
                "vq",
                r#""value quotes""#,
                "value quotes",
            ),
            (
                r#"veq=\"value escaped quotes\""#,
                "veq",
                "veq",
                r#"\"value escaped quotes\""#,
                r#"\"value escaped quotes\""#,
            ),
        ];

        let tokens: Vec<_> = Tokens::new(input).collect();
        assert_eq!(tokens.len(), expected.len());
        for (t, (raw, key, canonical_key, value, trimmed_value)) in tokens.iter().zip(expected) {
            assert_eq!(t.raw, raw, "raw values mismatch");
            assert_eq!(t.key, key, "keys mismatch");
            assert_eq!(t.canonical_key, canonical_key, "canonical keys mismatch");
            assert_eq!(t.value, value, "values mismatch");
            assert_eq!(t.trimmed_value(), trimmed_value, "trimmed values mismatch");
        }
    }

    #[test]
    fn test_tokens_extra_whitespace() {
        let raws: Vec<_> = Tokens::new("  foo=bar \t baz=fuz\n\nwiz   ")
            .map(|t| t.raw)
            .collect();
        assert_eq!(raws, ["foo=bar", "baz=fuz", "wiz"]);
    }

    #[test]
    fn test_tokens_unicode_quotes() {
        let raws: Vec<_> = Tokens::new("a=“x y“ b").map(|t| t.raw).collect();
        assert_eq!(raws, ["a=“x y“", "b"]);

        // other quotation marks inside a span are ordinary characters
        let raws: Vec<_> = Tokens::new("a=„x ' y„ b").map(|t| t.raw).collect();
        assert_eq!(raws, ["a=„x ' y„", "b"]);

        // a span ends only at the same mark that opened it
        let raws: Vec<_> = Tokens::new("a=«x y» b c").map(|t| t.raw).collect();
        assert_eq!(raws, ["a=«x y» b c"]);
    }

    #[test]
    fn test_tokens_unterminated_quote() {
        // an unterminated span swallows the rest of the input
        let raws: Vec<_> = Tokens::new(r#"a="x y b=c"#).map(|t| t.raw).collect();
        assert_eq!(raws, [r#"a="x y b=c"#]);
    }

    #[test]
    fn test_tokens_quoted_whole_argument() {
        let t = token(r#""foo=bar baz""#);
        assert_eq!(t.key, r#""foo"#);
        assert_eq!(t.value, r#"bar baz""#);
        // the value does not start with a quote, so nothing is stripped
        assert_eq!(t.trimmed_value(), r#"bar baz""#);
    }
}
