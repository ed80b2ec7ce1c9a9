//! Mongo extended-type wrappers: `{"$numberInt": "7"}` and friends, in both
//! the canonical wrapped form and the relaxed bare-scalar form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::DateTime;

use arrow_schema::{DataType, TimeUnit};

use rsf_core::errors::Result;
use rsf_core::schema::ColumnSchema;
use rsf_rowset::ColumnHandle;

use crate::parser::{require, ParseContext};
use crate::tokenizer::{JsonToken, Tokenizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtendedKind {
    Int32,
    Int64,
    Double,
    Decimal,
    Date,
    Timestamp,
    Binary,
}

impl ExtendedKind {
    pub fn from_key(key: &str) -> Option<ExtendedKind> {
        Some(match key {
            "$numberInt" => ExtendedKind::Int32,
            "$numberLong" => ExtendedKind::Int64,
            "$numberDouble" => ExtendedKind::Double,
            "$numberDecimal" => ExtendedKind::Decimal,
            "$date" => ExtendedKind::Date,
            "$timestamp" => ExtendedKind::Timestamp,
            "$binary" => ExtendedKind::Binary,
            _ => None?,
        })
    }

    pub fn column(self, name: &str) -> ColumnSchema {
        let data_type = match self {
            ExtendedKind::Int32 => DataType::Int32,
            ExtendedKind::Int64 => DataType::Int64,
            ExtendedKind::Double => DataType::Float64,
            ExtendedKind::Decimal => DataType::Decimal128(38, 10),
            ExtendedKind::Date => DataType::Date64,
            ExtendedKind::Timestamp => DataType::Timestamp(TimeUnit::Second, None),
            ExtendedKind::Binary => DataType::Binary,
        };
        ColumnSchema::optional(name, data_type)
    }
}

/// After an `{`, is this an extended-type wrapper? Leaves the stream where
/// it found it.
pub(crate) fn peek_extended(
    cx: &ParseContext<'_>,
    tokenizer: &mut Tokenizer,
) -> Result<Option<ExtendedKind>> {
    let peek = require(cx, tokenizer)?;
    tokenizer.push_back(peek.clone());
    if let JsonToken::Str(key) = &peek {
        Ok(ExtendedKind::from_key(key))
    } else {
        Ok(None)
    }
}

pub(crate) struct ExtendedParser {
    kind: ExtendedKind,
    handle: ColumnHandle,
}

impl ExtendedParser {
    pub fn new(kind: ExtendedKind, handle: ColumnHandle) -> Self {
        Self { kind, handle }
    }

    pub fn parse(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
        first: JsonToken,
    ) -> Result<()> {
        match first {
            JsonToken::Null => cx.loader.set_null(&self.handle),
            JsonToken::ObjectStart => {
                // canonical: { "$kind": value }
                let key = match require(cx, tokenizer)? {
                    JsonToken::Str(key) => key,
                    other => {
                        return Err(cx.syntax_error(
                            tokenizer,
                            format!("expected an extended type key, found {}", other.description()),
                        ))
                    }
                };
                let Some(kind) = ExtendedKind::from_key(&key) else {
                    return Err(cx.syntax_error(
                        tokenizer,
                        format!("unknown extended type key \"{}\"", key),
                    ));
                };
                expect(cx, tokenizer, JsonToken::Colon)?;
                let value = require(cx, tokenizer)?;
                self.write_value(cx, tokenizer, kind, value)?;
                expect(cx, tokenizer, JsonToken::ObjectEnd)
            }
            // relaxed: a bare scalar
            value => {
                let kind = self.kind;
                self.write_value(cx, tokenizer, kind, value)
            }
        }
    }

    fn write_value(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
        kind: ExtendedKind,
        value: JsonToken,
    ) -> Result<()> {
        match kind {
            ExtendedKind::Int32 | ExtendedKind::Int64 => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                JsonToken::Number(text) => {
                    let v = parse_long(cx, tokenizer, &text)?;
                    cx.loader.set_long(&self.handle, v)
                }
                JsonToken::Str(text) => cx.loader.set_string(&self.handle, &text),
                other => Err(unexpected(cx, tokenizer, &other)),
            },
            ExtendedKind::Double => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                JsonToken::Number(text) | JsonToken::Str(text) => {
                    let v = text.trim().parse::<f64>().map_err(|_| {
                        cx.syntax_error(tokenizer, format!("malformed number `{}`", text))
                    })?;
                    cx.loader.set_double(&self.handle, v)
                }
                other => Err(unexpected(cx, tokenizer, &other)),
            },
            ExtendedKind::Decimal => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                // the decimal writer parses the textual form itself
                JsonToken::Number(text) | JsonToken::Str(text) => {
                    cx.loader.set_string(&self.handle, &text)
                }
                other => Err(unexpected(cx, tokenizer, &other)),
            },
            ExtendedKind::Date => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                JsonToken::Number(text) => {
                    let millis = parse_long(cx, tokenizer, &text)?;
                    cx.loader.set_long(&self.handle, millis)
                }
                JsonToken::Str(text) => {
                    let parsed = DateTime::parse_from_rfc3339(text.trim()).map_err(|e| {
                        cx.syntax_error(tokenizer, format!("malformed date `{}`: {}", text, e))
                    })?;
                    cx.loader.set_long(&self.handle, parsed.timestamp_millis())
                }
                // canonical long form: { "$numberLong": "..." }
                JsonToken::ObjectStart => {
                    let millis = self.parse_wrapped_long(cx, tokenizer)?;
                    cx.loader.set_long(&self.handle, millis)
                }
                other => Err(unexpected(cx, tokenizer, &other)),
            },
            ExtendedKind::Timestamp => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                JsonToken::Number(text) => {
                    let seconds = parse_long(cx, tokenizer, &text)?;
                    cx.loader.set_long(&self.handle, seconds)
                }
                // canonical: { "t": seconds, "i": ordinal }
                JsonToken::ObjectStart => {
                    let mut seconds = None;
                    loop {
                        match require(cx, tokenizer)? {
                            JsonToken::ObjectEnd => break,
                            JsonToken::Comma => continue,
                            JsonToken::Str(key) => {
                                expect(cx, tokenizer, JsonToken::Colon)?;
                                match require(cx, tokenizer)? {
                                    JsonToken::Number(text) => {
                                        if key == "t" {
                                            seconds = Some(parse_long(cx, tokenizer, &text)?);
                                        }
                                    }
                                    other => return Err(unexpected(cx, tokenizer, &other)),
                                }
                            }
                            other => return Err(unexpected(cx, tokenizer, &other)),
                        }
                    }
                    match seconds {
                        Some(seconds) => cx.loader.set_long(&self.handle, seconds),
                        None => Err(cx.syntax_error(tokenizer, "timestamp without a `t` field")),
                    }
                }
                other => Err(unexpected(cx, tokenizer, &other)),
            },
            ExtendedKind::Binary => match value {
                JsonToken::Null => cx.loader.set_null(&self.handle),
                JsonToken::Str(text) => {
                    let bytes = decode_base64(cx, tokenizer, &text)?;
                    cx.loader.set_bytes(&self.handle, &bytes)
                }
                // canonical: { "base64": "...", "subType": "..." }
                JsonToken::ObjectStart => {
                    let mut payload = None;
                    loop {
                        match require(cx, tokenizer)? {
                            JsonToken::ObjectEnd => break,
                            JsonToken::Comma => continue,
                            JsonToken::Str(key) => {
                                expect(cx, tokenizer, JsonToken::Colon)?;
                                match require(cx, tokenizer)? {
                                    JsonToken::Str(text) => {
                                        if key == "base64" {
                                            payload = Some(decode_base64(cx, tokenizer, &text)?);
                                        }
                                    }
                                    other => return Err(unexpected(cx, tokenizer, &other)),
                                }
                            }
                            other => return Err(unexpected(cx, tokenizer, &other)),
                        }
                    }
                    match payload {
                        Some(bytes) => cx.loader.set_bytes(&self.handle, &bytes),
                        None => Err(cx.syntax_error(tokenizer, "binary without a `base64` field")),
                    }
                }
                other => Err(unexpected(cx, tokenizer, &other)),
            },
        }
    }

    fn parse_wrapped_long(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
    ) -> Result<i64> {
        expect(cx, tokenizer, JsonToken::Str("$numberLong".to_string()))?;
        expect(cx, tokenizer, JsonToken::Colon)?;
        let value = match require(cx, tokenizer)? {
            JsonToken::Number(text) | JsonToken::Str(text) => parse_long(cx, tokenizer, &text)?,
            other => return Err(unexpected(cx, tokenizer, &other)),
        };
        expect(cx, tokenizer, JsonToken::ObjectEnd)?;
        Ok(value)
    }
}

fn expect(cx: &ParseContext<'_>, tokenizer: &mut Tokenizer, token: JsonToken) -> Result<()> {
    let found = require(cx, tokenizer)?;
    if found == token {
        Ok(())
    } else {
        Err(cx.syntax_error(
            tokenizer,
            format!(
                "expected {}, found {}",
                token.description(),
                found.description()
            ),
        ))
    }
}

fn unexpected(
    cx: &ParseContext<'_>,
    tokenizer: &Tokenizer,
    token: &JsonToken,
) -> rsf_core::errors::Error {
    cx.syntax_error(
        tokenizer,
        format!("unexpected {} in an extended type value", token.description()),
    )
}

fn parse_long(cx: &ParseContext<'_>, tokenizer: &Tokenizer, text: &str) -> Result<i64> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| cx.syntax_error(tokenizer, format!("malformed integer `{}`", text)))
}

fn decode_base64(cx: &ParseContext<'_>, tokenizer: &Tokenizer, text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.as_bytes())
        .map_err(|e| cx.syntax_error(tokenizer, format!("invalid base64 payload: {}", e)))
}
