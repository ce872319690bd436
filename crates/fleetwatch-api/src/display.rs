//! Decoder for the `display(<object-literal>)` telemetry envelope.
//!
//! Devices answer a poll with a script-style body such as
//!
//! ```text
//! display({seq: "42", temp: '21.5', "fan speed": 1200, alarm: false});
//! ```
//!
//! The body is never evaluated. This module implements a small
//! recursive-descent parser for exactly that grammar:
//!
//! - the `display(` ... `)` wrapper, optionally followed by `;`
//! - a single flat object literal with identifier, quoted, or numeric keys
//! - scalar values only: quoted strings, numbers (including `NaN` and
//!   `Infinity`), `true` / `false`
//! - `null` / `undefined` values drop the key
//! - a repeated key replaces the earlier value
//! - trailing commas are tolerated
//!
//! Every value is surfaced as a string. Numbers are rendered the way a
//! script engine would print them, so `0x1F`, `1e3` and `1.50` become
//! `31`, `1000` and `1.5`. Nested objects or arrays are a [`FormatError`],
//! as is an envelope lacking the configured sequence key.

use std::collections::BTreeMap;

use crate::error::FormatError;

const ENVELOPE: &str = "display";

// ── Telemetry ────────────────────────────────────────────────────────

/// A decoded telemetry payload: flat string properties plus the
/// sequence token the device wants echoed on the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    sequence: String,
    properties: BTreeMap<String, String>,
}

impl Telemetry {
    /// Build a payload directly. Returns `None` if `sequence_key` is
    /// absent from `properties`.
    pub fn new(properties: BTreeMap<String, String>, sequence_key: &str) -> Option<Self> {
        let sequence = properties.get(sequence_key)?.clone();
        Some(Self {
            sequence,
            properties,
        })
    }

    /// The sequence token to send with the next request.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// All properties, including the sequence key itself.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn into_properties(self) -> BTreeMap<String, String> {
        self.properties
    }
}

/// Decode a poll response body, requiring `sequence_key` to be present.
pub fn parse_display(body: &str, sequence_key: &str) -> Result<Telemetry, FormatError> {
    let properties = Parser::new(body).envelope()?;
    Telemetry::new(properties, sequence_key).ok_or_else(|| FormatError::MissingSequenceKey {
        key: sequence_key.to_owned(),
    })
}

// ── Parser ───────────────────────────────────────────────────────────

enum Scalar {
    Text(String),
    Absent,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn envelope(mut self) -> Result<BTreeMap<String, String>, FormatError> {
        self.skip_ws();
        if !self.rest().starts_with(ENVELOPE) {
            return Err(FormatError::MissingEnvelope);
        }
        self.pos += ENVELOPE.len();
        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(FormatError::MissingEnvelope);
        }
        self.bump();
        self.skip_ws();

        let object = self.object()?;

        self.skip_ws();
        self.expect(')', "`)` closing the envelope")?;
        self.skip_ws();
        if self.peek() == Some(';') {
            self.bump();
            self.skip_ws();
        }
        match self.peek() {
            None => Ok(object),
            Some(found) => Err(FormatError::Unexpected {
                found,
                offset: self.pos,
                expected: "end of input",
            }),
        }
    }

    fn object(&mut self) -> Result<BTreeMap<String, String>, FormatError> {
        self.expect('{', "`{` opening the object")?;
        let mut map = BTreeMap::new();

        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(map);
            }

            let key = self.key()?;
            self.skip_ws();
            self.expect(':', "`:` after key")?;
            self.skip_ws();
            match self.value(&key)? {
                Scalar::Text(text) => {
                    map.insert(key, text);
                }
                Scalar::Absent => {
                    map.remove(&key);
                }
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                Some('}') => {}
                Some(found) => {
                    return Err(FormatError::Unexpected {
                        found,
                        offset: self.pos,
                        expected: "`,` or `}`",
                    });
                }
                None => return Err(FormatError::UnexpectedEnd { expected: "`}`" }),
            }
        }
    }

    fn key(&mut self) -> Result<String, FormatError> {
        match self.peek() {
            Some('"' | '\'') => self.string(),
            Some(c) if is_ident_start(c) => Ok(self.identifier().to_owned()),
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(found) => Err(FormatError::Unexpected {
                found,
                offset: self.pos,
                expected: "a property key",
            }),
            None => Err(FormatError::UnexpectedEnd {
                expected: "a property key",
            }),
        }
    }

    fn value(&mut self, key: &str) -> Result<Scalar, FormatError> {
        match self.peek() {
            Some('"' | '\'') => self.string().map(Scalar::Text),
            Some('{' | '[') => Err(FormatError::NestedValue {
                key: key.to_owned(),
            }),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.number().map(Scalar::Text)
            }
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                match self.identifier() {
                    "true" => Ok(Scalar::Text("true".into())),
                    "false" => Ok(Scalar::Text("false".into())),
                    "NaN" => Ok(Scalar::Text("NaN".into())),
                    "Infinity" => Ok(Scalar::Text("Infinity".into())),
                    "null" | "undefined" => Ok(Scalar::Absent),
                    _ => Err(FormatError::Unexpected {
                        found: c,
                        offset: start,
                        expected: "a string, number, or boolean",
                    }),
                }
            }
            Some(found) => Err(FormatError::Unexpected {
                found,
                offset: self.pos,
                expected: "a value",
            }),
            None => Err(FormatError::UnexpectedEnd {
                expected: "a value",
            }),
        }
    }

    fn string(&mut self) -> Result<String, FormatError> {
        let start = self.pos;
        let Some(quote) = self.peek() else {
            return Err(FormatError::UnexpectedEnd {
                expected: "a string",
            });
        };
        self.bump();

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(FormatError::UnterminatedString { offset: start });
            };
            self.bump();
            match c {
                c if c == quote => return Ok(out),
                '\n' | '\r' => return Err(FormatError::UnterminatedString { offset: start }),
                '\\' => self.escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), FormatError> {
        let offset = self.pos.saturating_sub(1);
        let Some(c) = self.peek() else {
            return Err(FormatError::InvalidEscape { offset });
        };
        self.bump();
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => out.push(self.hex_char(2, offset)?),
            'u' => out.push(self.unicode_escape(offset)?),
            // line continuation
            '\n' => {}
            '\\' | '\'' | '"' | '/' => out.push(c),
            _ => return Err(FormatError::InvalidEscape { offset }),
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize, offset: usize) -> Result<char, FormatError> {
        let code = self.hex_code(digits, offset)?;
        char::from_u32(code).ok_or(FormatError::InvalidEscape { offset })
    }

    fn hex_code(&mut self, digits: usize, offset: usize) -> Result<u32, FormatError> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or(FormatError::InvalidEscape { offset })?;
        let code =
            u32::from_str_radix(hex, 16).map_err(|_| FormatError::InvalidEscape { offset })?;
        self.pos = end;
        Ok(code)
    }

    /// `\uXXXX`, `\u{X...}`, or a `\uD83D\uDE00` surrogate pair.
    /// An unpaired surrogate becomes U+FFFD.
    fn unicode_escape(&mut self, offset: usize) -> Result<char, FormatError> {
        if self.peek() == Some('{') {
            self.bump();
            let len = self
                .rest()
                .find('}')
                .ok_or(FormatError::InvalidEscape { offset })?;
            let c = self.hex_char(len, offset)?;
            self.bump();
            return Ok(c);
        }

        let high = self.hex_code(4, offset)?;
        if !(0xD800..0xDC00).contains(&high) {
            return Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
        }

        let checkpoint = self.pos;
        if self.rest().starts_with("\\u") {
            self.pos += 2;
            if let Ok(low @ 0xDC00..=0xDFFF) = self.hex_code(4, offset) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            self.pos = checkpoint;
        }
        Ok(char::REPLACEMENT_CHARACTER)
    }

    fn number(&mut self) -> Result<String, FormatError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        normalize_number(text).ok_or_else(|| FormatError::Unexpected {
            found: text.chars().next().unwrap_or(' '),
            offset: start,
            expected: "a number",
        })
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn expect(&mut self, want: char, expected: &'static str) -> Result<(), FormatError> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(FormatError::Unexpected {
                found,
                offset: self.pos,
                expected,
            }),
            None => Err(FormatError::UnexpectedEnd { expected }),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '\u{feff}' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }
}

// ── Numbers ──────────────────────────────────────────────────────────

/// Canonical text of a numeric literal, or `None` if it is not one.
fn normalize_number(literal: &str) -> Option<String> {
    let (negative, body) = match literal.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };

    let magnitude: f64 = match body {
        "Infinity" => f64::INFINITY,
        "NaN" => f64::NAN,
        _ => {
            let digits = body.replace('_', "");
            let radix = match digits.get(..2) {
                Some("0x" | "0X") => Some(16),
                Some("0o" | "0O") => Some(8),
                Some("0b" | "0B") => Some(2),
                _ => None,
            };
            match radix {
                Some(radix) => {
                    let rest = digits.get(2..).filter(|r| {
                        !r.is_empty() && r.chars().all(|c| c.is_digit(radix))
                    })?;
                    u128::from_str_radix(rest, radix).ok()?.to_string().parse().ok()?
                }
                None if digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
                    && digits.chars().any(|c| c.is_ascii_digit()) =>
                {
                    digits.parse().ok()?
                }
                None => return None,
            }
        }
    };

    Some(format_number(if negative { -magnitude } else { magnitude }))
}

/// Shortest round-trip text, switching to exponent form outside
/// `[1e-6, 1e21)`.
fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if value == 0.0 {
        return "0".into();
    }
    if (1e-6..1e21).contains(&value.abs()) {
        return value.to_string();
    }
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parses_unquoted_keys_and_mixed_values() {
        let body = r#"display({seq: "7", temp: '21.5', "fan speed": 1200, alarm: false});"#;
        let t = parse_display(body, "seq").unwrap();

        assert_eq!(t.sequence(), "7");
        assert_eq!(
            t.properties(),
            &props(&[
                ("alarm", "false"),
                ("fan speed", "1200"),
                ("seq", "7"),
                ("temp", "21.5"),
            ])
        );
    }

    #[test]
    fn tolerates_whitespace_and_trailing_comma() {
        let body = "\n  display (\n  {\n    seq : 3 ,\n    name: \"ups-1\",\n  }\n )\n";
        let t = parse_display(body, "seq").unwrap();
        assert_eq!(t.sequence(), "3");
        assert_eq!(t.properties().get("name").map(String::as_str), Some("ups-1"));
    }

    #[test]
    fn empty_object_lacks_sequence_key() {
        let err = parse_display("display({})", "seq").unwrap_err();
        assert_eq!(
            err,
            FormatError::MissingSequenceKey { key: "seq".into() }
        );
    }

    #[test]
    fn decodes_escapes() {
        let body = r#"display({seq: '1', msg: "a\"b\\cA\x42\n"})"#;
        let t = parse_display(body, "seq").unwrap();
        assert_eq!(t.properties()["msg"], "a\"b\\cAB\n");
    }

    #[test]
    fn null_and_undefined_drop_the_key() {
        let t = parse_display("display({seq: 1, a: null, b: undefined, c: 'x'})", "seq").unwrap();
        assert_eq!(t.properties(), &props(&[("c", "x"), ("seq", "1")]));
    }

    #[test]
    fn rejects_missing_envelope() {
        assert_eq!(
            parse_display(r#"{"seq": "1"}"#, "seq").unwrap_err(),
            FormatError::MissingEnvelope
        );
        assert_eq!(
            parse_display("show({seq: 1})", "seq").unwrap_err(),
            FormatError::MissingEnvelope
        );
        assert_eq!(
            parse_display("display {seq: 1}", "seq").unwrap_err(),
            FormatError::MissingEnvelope
        );
    }

    #[test]
    fn rejects_nested_values() {
        let err = parse_display("display({seq: 1, ports: [1, 2]})", "seq").unwrap_err();
        assert_eq!(err, FormatError::NestedValue { key: "ports".into() });

        let err = parse_display("display({seq: 1, cfg: {a: 1}})", "seq").unwrap_err();
        assert_eq!(err, FormatError::NestedValue { key: "cfg".into() });
    }

    #[test]
    fn rejects_code_instead_of_values() {
        let err = parse_display("display({seq: 1, x: alert(1)})", "seq").unwrap_err();
        assert!(matches!(err, FormatError::Unexpected { .. }), "got {err:?}");

        let err = parse_display("display({seq: 1}); evil()", "seq").unwrap_err();
        assert!(matches!(err, FormatError::Unexpected { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_unterminated_input() {
        assert_eq!(
            parse_display("display({seq: 'abc})", "seq").unwrap_err(),
            FormatError::UnterminatedString { offset: 14 }
        );
        assert!(matches!(
            parse_display("display({seq: 1", "seq").unwrap_err(),
            FormatError::UnexpectedEnd { .. }
        ));
        assert!(matches!(
            parse_display("display({seq: 1}", "seq").unwrap_err(),
            FormatError::UnexpectedEnd { .. }
        ));
    }

    #[test]
    fn repeated_key_keeps_the_last_value() {
        let t = parse_display("display({seq: 1, mode: 'a', mode: 'b', seq: 2})", "seq").unwrap();
        assert_eq!(t.sequence(), "2");
        assert_eq!(t.properties()["mode"], "b");

        let t = parse_display("display({seq: 1, a: null, a: 2, b: 3, b: null})", "seq").unwrap();
        assert_eq!(t.properties(), &props(&[("a", "2"), ("seq", "1")]));
    }

    #[test]
    fn non_finite_numbers_are_values() {
        let t = parse_display(
            "display({seq: 1, temp: NaN, limit: Infinity, floor: -Infinity, x: +Infinity})",
            "seq",
        )
        .unwrap();
        assert_eq!(
            t.properties(),
            &props(&[
                ("floor", "-Infinity"),
                ("limit", "Infinity"),
                ("seq", "1"),
                ("temp", "NaN"),
                ("x", "Infinity"),
            ])
        );
    }

    #[test]
    fn numbers_are_canonicalized() {
        let body = "display({seq: 0x1F, a: 1e3, b: 1.50, c: -0, d: .5, e: 1_000, \
                    f: 1e21, g: 1e-7, h: 0b101, i: 2.5E+2, 010: 'key'})";
        let t = parse_display(body, "seq").unwrap();
        assert_eq!(t.sequence(), "31");
        assert_eq!(
            t.properties(),
            &props(&[
                ("10", "key"),
                ("a", "1000"),
                ("b", "1.5"),
                ("c", "0"),
                ("d", "0.5"),
                ("e", "1000"),
                ("f", "1e+21"),
                ("g", "1e-7"),
                ("h", "5"),
                ("i", "250"),
                ("seq", "31"),
            ])
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        for body in ["display({seq: 1.2.3})", "display({seq: 0x})", "display({seq: 12abc})"] {
            let err = parse_display(body, "seq").unwrap_err();
            assert!(matches!(err, FormatError::Unexpected { .. }), "{body}: {err:?}");
        }
    }

    #[test]
    fn joins_surrogate_pairs() {
        let body = r#"display({seq: 1, face: "\uD83D\uDE00", brace: '\u{1F600}', lone: "\uD83Dx"})"#;
        let t = parse_display(body, "seq").unwrap();
        assert_eq!(t.properties()["face"], "\u{1F600}");
        assert_eq!(t.properties()["brace"], "\u{1F600}");
        assert_eq!(t.properties()["lone"], "\u{FFFD}x");
    }

    #[test]
    fn telemetry_new_requires_sequence_key() {
        assert!(Telemetry::new(props(&[("a", "1")]), "seq").is_none());
        let t = Telemetry::new(props(&[("seq", "9")]), "seq").unwrap();
        assert_eq!(t.sequence(), "9");
    }
}
