//! Python literal encoding and decoding
//!
//! Remote statements embed paths and payloads as Python literals, and
//! remote expressions come back as `repr` text. Only the primitives the
//! query layer needs are understood: `True`/`False`, integers, `str`,
//! `bytes` and flat lists of those.

use std::fmt::Write as _;

/// Quote `value` as a single-quoted Python `str` literal
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Encode `data` as a `bytes` literal with every byte hex-escaped
pub fn bytes_literal(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 3);
    out.push_str("b'");
    for byte in data {
        let _ = write!(out, "\\x{:02x}", byte);
    }
    out.push('\'');
    out
}

/// Literal syntax error, carrying a short description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError(pub String);

/// Parse `True` or `False`
pub fn parse_bool(text: &str) -> Result<bool, LiteralError> {
    match text.trim() {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(LiteralError(format!("not a bool: {other}"))),
    }
}

/// Parse a decimal or `0x` prefixed integer
pub fn parse_int(text: &str) -> Result<i64, LiteralError> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|_| LiteralError(format!("not an int: {text}")))?;
    Ok(if negative { -value } else { value })
}

/// Parse a single `str` literal
pub fn parse_str(text: &str) -> Result<String, LiteralError> {
    let mut parser = LiteralParser::new(text);
    let value = parser.string()?;
    parser.end()?;
    Ok(value)
}

/// Parse a single `bytes` literal
pub fn parse_bytes(text: &str) -> Result<Vec<u8>, LiteralError> {
    let mut parser = LiteralParser::new(text);
    let value = parser.bytes()?;
    parser.end()?;
    Ok(value)
}

/// Parse a flat list of `str` literals such as the repr of `os.listdir()`
pub fn parse_str_list(text: &str) -> Result<Vec<String>, LiteralError> {
    let mut parser = LiteralParser::new(text);
    parser.expect('[')?;
    let mut items = Vec::new();
    if !parser.eat(']') {
        loop {
            items.push(parser.string()?);
            if parser.eat(']') {
                break;
            }
            parser.expect(',')?;
            // Tolerate a trailing comma
            if parser.eat(']') {
                break;
            }
        }
    }
    parser.end()?;
    Ok(items)
}

/// Cursor over a sequence of comma separated literals
pub struct LiteralParser<'a> {
    rest: &'a str,
}

impl<'a> LiteralParser<'a> {
    /// Start parsing `text`
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    /// Consume `c` if it is the next non-blank character
    pub fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    /// Require `c` as the next non-blank character
    pub fn expect(&mut self, c: char) -> Result<(), LiteralError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(LiteralError(format!("expected '{c}' at {:?}", self.rest)))
        }
    }

    /// Require that nothing but whitespace is left
    pub fn end(&mut self) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(LiteralError(format!("trailing input {:?}", self.rest)))
        }
    }

    /// Parse a `str` literal
    pub fn string(&mut self) -> Result<String, LiteralError> {
        self.skip_ws();
        let units = self.quoted()?;
        Ok(units
            .into_iter()
            .map(|unit| match unit {
                Unit::Char(c) => c,
                Unit::Byte(b) => char::from(b),
            })
            .collect())
    }

    /// Parse a `bytes` literal
    pub fn bytes(&mut self) -> Result<Vec<u8>, LiteralError> {
        self.skip_ws();
        self.rest = self
            .rest
            .strip_prefix('b')
            .ok_or_else(|| LiteralError(format!("not a bytes literal: {:?}", self.rest)))?;
        let mut out = Vec::new();
        for unit in self.quoted()? {
            match unit {
                Unit::Byte(b) => out.push(b),
                Unit::Char(c) => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Ok(out)
    }

    fn quoted(&mut self) -> Result<Vec<Unit>, LiteralError> {
        let mut chars = self.rest.char_indices();
        let quote = match chars.next() {
            Some((_, q @ ('\'' | '"'))) => q,
            _ => return Err(LiteralError(format!("expected a quote at {:?}", self.rest))),
        };

        let mut units = Vec::new();
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.rest = &self.rest[idx + c.len_utf8()..];
                return Ok(units);
            }
            if c != '\\' {
                units.push(Unit::Char(c));
                continue;
            }
            let Some((_, escaped)) = chars.next() else {
                break;
            };
            match escaped {
                '\\' => units.push(Unit::Char('\\')),
                '\'' => units.push(Unit::Char('\'')),
                '"' => units.push(Unit::Char('"')),
                'n' => units.push(Unit::Char('\n')),
                'r' => units.push(Unit::Char('\r')),
                't' => units.push(Unit::Char('\t')),
                '0' => units.push(Unit::Byte(0)),
                'x' => {
                    let hi = chars.next().map(|(_, c)| c);
                    let lo = chars.next().map(|(_, c)| c);
                    let value = match (hi, lo) {
                        (Some(hi), Some(lo)) => {
                            u8::from_str_radix(&format!("{hi}{lo}"), 16).ok()
                        }
                        _ => None,
                    };
                    let byte = value.ok_or_else(|| LiteralError("bad \\x escape".to_string()))?;
                    units.push(Unit::Byte(byte));
                }
                // Unknown escapes keep their backslash, as Python does
                other => {
                    units.push(Unit::Char('\\'));
                    units.push(Unit::Char(other));
                }
            }
        }
        Err(LiteralError("unterminated string literal".to_string()))
    }
}

enum Unit {
    Char(char),
    Byte(u8),
}
