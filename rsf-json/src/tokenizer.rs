//! Pull tokenizer over a byte buffer. Tracks the byte offset of every token
//! for error reporting and supports a small pushback stack so the structural
//! parsers can look ahead during type detection.

use bytes::Bytes;

use rsf_core::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum JsonToken {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    Colon,
    Comma,
    Str(String),
    /// Raw numeric text; classification happens at the point of use.
    Number(String),
    Bool(bool),
    Null,
}

impl JsonToken {
    pub fn description(&self) -> String {
        match self {
            JsonToken::ObjectStart => "`{`".to_string(),
            JsonToken::ObjectEnd => "`}`".to_string(),
            JsonToken::ArrayStart => "`[`".to_string(),
            JsonToken::ArrayEnd => "`]`".to_string(),
            JsonToken::Colon => "`:`".to_string(),
            JsonToken::Comma => "`,`".to_string(),
            JsonToken::Str(s) => format!("string \"{}\"", s),
            JsonToken::Number(n) => format!("number {}", n),
            JsonToken::Bool(b) => format!("{}", b),
            JsonToken::Null => "null".to_string(),
        }
    }
}

pub struct Tokenizer {
    buf: Bytes,
    pos: usize,
    allow_nan_inf: bool,
    pushback: Vec<(JsonToken, u64)>,
    last_offset: u64,
}

impl Tokenizer {
    pub fn new(buf: Bytes, allow_nan_inf: bool) -> Self {
        Self {
            buf,
            pos: 0,
            allow_nan_inf,
            pushback: Vec::new(),
            last_offset: 0,
        }
    }

    /// Byte offset of the most recently returned token.
    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    /// Return a token to the stream; it comes back from the next call.
    pub fn push_back(&mut self, token: JsonToken) {
        self.pushback.push((token, self.last_offset));
    }

    pub fn syntax_error(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            message: message.into(),
            path: String::new(),
            offset: self.last_offset,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<JsonToken>> {
        if let Some((token, offset)) = self.pushback.pop() {
            self.last_offset = offset;
            return Ok(Some(token));
        }
        self.skip_whitespace();
        let Some(&byte) = self.buf.get(self.pos) else {
            self.last_offset = self.pos as u64;
            return Ok(None);
        };
        self.last_offset = self.pos as u64;
        let token = match byte {
            b'{' => {
                self.pos += 1;
                JsonToken::ObjectStart
            }
            b'}' => {
                self.pos += 1;
                JsonToken::ObjectEnd
            }
            b'[' => {
                self.pos += 1;
                JsonToken::ArrayStart
            }
            b']' => {
                self.pos += 1;
                JsonToken::ArrayEnd
            }
            b':' => {
                self.pos += 1;
                JsonToken::Colon
            }
            b',' => {
                self.pos += 1;
                JsonToken::Comma
            }
            b'"' => JsonToken::Str(self.lex_string()?),
            b'-' | b'+' | b'0'..=b'9' => JsonToken::Number(self.lex_number()?),
            b't' => {
                self.expect_keyword("true")?;
                JsonToken::Bool(true)
            }
            b'f' => {
                self.expect_keyword("false")?;
                JsonToken::Bool(false)
            }
            b'n' => {
                self.expect_keyword("null")?;
                JsonToken::Null
            }
            b'N' if self.allow_nan_inf => {
                self.expect_keyword("NaN")?;
                JsonToken::Number("NaN".to_string())
            }
            b'I' if self.allow_nan_inf => {
                self.expect_keyword("Infinity")?;
                JsonToken::Number("Infinity".to_string())
            }
            other => {
                return Err(self.syntax_error(format!(
                    "unexpected character `{}`",
                    (other as char).escape_default()
                )))
            }
        };
        Ok(Some(token))
    }

    fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.buf.get(self.pos) {
            if matches!(byte, b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let end = self.pos + keyword.len();
        if self.buf.get(self.pos..end) == Some(keyword.as_bytes()) {
            self.pos = end;
            Ok(())
        } else {
            Err(self.syntax_error(format!("expected `{}`", keyword)))
        }
    }

    fn lex_number(&mut self) -> Result<String> {
        let start = self.pos;
        if matches!(self.buf.get(self.pos), Some(b'-') | Some(b'+')) {
            self.pos += 1;
            // -Infinity is a number when the relaxed literals are on
            if self.allow_nan_inf && self.buf.get(self.pos) == Some(&b'I') {
                self.expect_keyword("Infinity")?;
                return Ok(String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned());
            }
        }
        let mut seen_digit = false;
        while let Some(&byte) = self.buf.get(self.pos) {
            match byte {
                b'0'..=b'9' => {
                    seen_digit = true;
                    self.pos += 1;
                }
                b'.' | b'e' | b'E' | b'-' | b'+' => self.pos += 1,
                _ => break,
            }
        }
        if !seen_digit {
            return Err(self.syntax_error("malformed number"));
        }
        Ok(String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned())
    }

    fn lex_string(&mut self) -> Result<String> {
        // opening quote
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(self.syntax_error("unterminated string"));
            };
            match byte {
                b'"' => {
                    self.pos += 1;
                    return String::from_utf8(out)
                        .map_err(|_| self.syntax_error("invalid UTF-8 in string"));
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(&escape) = self.buf.get(self.pos) else {
                        return Err(self.syntax_error("unterminated escape"));
                    };
                    self.pos += 1;
                    match escape {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let c = self.lex_unicode_escape()?;
                            let mut encoded = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut encoded).as_bytes());
                        }
                        other => {
                            return Err(self.syntax_error(format!(
                                "invalid escape `\\{}`",
                                (other as char).escape_default()
                            )))
                        }
                    }
                }
                0x00..=0x1f => {
                    return Err(self.syntax_error("unescaped control character in string"))
                }
                _ => {
                    out.push(byte);
                    self.pos += 1;
                }
            }
        }
    }

    fn lex_unicode_escape(&mut self) -> Result<char> {
        let high = self.lex_hex4()?;
        // surrogate pair
        if (0xd800..=0xdbff).contains(&high) {
            if self.buf.get(self.pos..self.pos + 2) != Some(b"\\u".as_slice()) {
                return Err(self.syntax_error("unpaired surrogate in string"));
            }
            self.pos += 2;
            let low = self.lex_hex4()?;
            if !(0xdc00..=0xdfff).contains(&low) {
                return Err(self.syntax_error("unpaired surrogate in string"));
            }
            let combined = 0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00);
            return char::from_u32(combined)
                .ok_or_else(|| self.syntax_error("invalid unicode escape"));
        }
        char::from_u32(high).ok_or_else(|| self.syntax_error("invalid unicode escape"))
    }

    fn lex_hex4(&mut self) -> Result<u32> {
        let Some(digits) = self.buf.get(self.pos..self.pos + 4) else {
            return Err(self.syntax_error("truncated unicode escape"));
        };
        let text = std::str::from_utf8(digits)
            .map_err(|_| self.syntax_error("invalid unicode escape"))?;
        let value = u32::from_str_radix(text, 16)
            .map_err(|_| self.syntax_error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<JsonToken> {
        let mut tokenizer = Tokenizer::new(Bytes::copy_from_slice(input.as_bytes()), false);
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next_token().unwrap() {
            out.push(token);
        }
        out
    }

    #[test]
    fn test_structural_tokens() {
        assert_eq!(
            tokens(r#"{"a": [1, null]}"#),
            vec![
                JsonToken::ObjectStart,
                JsonToken::Str("a".to_string()),
                JsonToken::Colon,
                JsonToken::ArrayStart,
                JsonToken::Number("1".to_string()),
                JsonToken::Comma,
                JsonToken::Null,
                JsonToken::ArrayEnd,
                JsonToken::ObjectEnd,
            ]
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            tokens(r#""a\n\t\"\\A""#),
            vec![JsonToken::Str("a\n\t\"\\A".to_string())]
        );
        assert_eq!(
            tokens(r#""😀""#),
            vec![JsonToken::Str("😀".to_string())]
        );
    }

    #[test]
    fn test_offsets() {
        let mut tokenizer = Tokenizer::new(Bytes::from_static(b"  {\"a\": 10}"), false);
        tokenizer.next_token().unwrap();
        assert_eq!(tokenizer.last_offset(), 2);
        tokenizer.next_token().unwrap();
        assert_eq!(tokenizer.last_offset(), 3);
    }

    #[test]
    fn test_push_back() {
        let mut tokenizer = Tokenizer::new(Bytes::from_static(b"[1]"), false);
        let first = tokenizer.next_token().unwrap().unwrap();
        tokenizer.push_back(first.clone());
        assert_eq!(tokenizer.next_token().unwrap().unwrap(), first);
        assert_eq!(
            tokenizer.next_token().unwrap().unwrap(),
            JsonToken::Number("1".to_string())
        );
    }

    #[test]
    fn test_nan_and_infinity_gated() {
        let mut strict = Tokenizer::new(Bytes::from_static(b"NaN"), false);
        assert!(strict.next_token().is_err());
        let mut relaxed = Tokenizer::new(Bytes::from_static(b"NaN -Infinity"), true);
        assert_eq!(
            relaxed.next_token().unwrap().unwrap(),
            JsonToken::Number("NaN".to_string())
        );
        assert_eq!(
            relaxed.next_token().unwrap().unwrap(),
            JsonToken::Number("-Infinity".to_string())
        );
    }

    #[test]
    fn test_error_carries_offset() {
        let mut tokenizer = Tokenizer::new(Bytes::from_static(b"   @"), false);
        let err = tokenizer.next_token().unwrap_err();
        match err {
            rsf_core::errors::Error::Syntax { offset, .. } => assert_eq!(offset, 3),
            other => panic!("expected syntax error, got {other}"),
        }
    }

    #[test]
    fn test_matches_serde_for_scalars() {
        // serde_json is the oracle for string unescaping
        let input = r#""élève 🤔""#;
        let expected: String = serde_json::from_str(input).unwrap();
        assert_eq!(tokens(input), vec![JsonToken::Str(expected)]);
    }
}
