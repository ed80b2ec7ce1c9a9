//! Implicit conversions from reader-supplied values to column native types.
//!
//! Narrowing integer conversions are bounds-checked; float to integer rounds
//! half away from zero before the bounds check; temporal columns parse text
//! using the column's `format` property, ISO by default.

use arrow_schema::DataType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use num::ToPrimitive;

use rsf_core::errors::{Error, Result};
use rsf_core::schema::{ColumnSchema, FORMAT_PROP};

use crate::writers::ValueRef;

#[derive(Debug)]
pub(crate) enum Converted<N> {
    Value(N),
    Null,
}

pub(crate) fn overflow_error(
    schema: &ColumnSchema,
    value: impl ToString,
    target: &str,
) -> Error {
    Error::ConversionOverflow {
        column: schema.name().to_string(),
        value: value.to_string(),
        target: target.to_string(),
    }
}

pub(crate) fn invalid_error(schema: &ColumnSchema, message: impl Into<String>) -> Error {
    Error::InvalidConversion {
        column: schema.name().to_string(),
        message: message.into(),
    }
}

/// Conversion into the native value of a typed writer. The target semantics
/// come from the column schema, not from the native type alone: `i64` backs
/// BIGINT, DATE and TIMESTAMP columns.
pub(crate) trait WriterNative: arrow_buffer::ArrowNativeType {
    fn convert(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<Self>>;
}

impl WriterNative for i32 {
    fn convert(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i32>> {
        Ok(Converted::Value(match value {
            ValueRef::Null => return Ok(Converted::Null),
            ValueRef::Int(v) => v,
            ValueRef::Long(v) => v
                .to_i32()
                .ok_or_else(|| overflow_error(schema, v, "INT"))?,
            ValueRef::Double(v) => v
                .round()
                .to_i32()
                .ok_or_else(|| overflow_error(schema, v, "INT"))?,
            ValueRef::Str(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|e| invalid_error(schema, format!("`{}` is not an INT: {}", s, e)))?,
            other => {
                return Err(invalid_error(
                    schema,
                    format!("cannot write {} as INT", other.type_name()),
                ))
            }
        }))
    }
}

impl WriterNative for i64 {
    fn convert(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i64>> {
        match schema.data_type() {
            DataType::Date64 => date64_from(schema, value),
            DataType::Timestamp(_, _) => timestamp_seconds_from(schema, value),
            _ => bigint_from(schema, value),
        }
    }
}

impl WriterNative for f64 {
    fn convert(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<f64>> {
        Ok(Converted::Value(match value {
            ValueRef::Null => return Ok(Converted::Null),
            ValueRef::Int(v) => v as f64,
            ValueRef::Long(v) => v as f64,
            ValueRef::Double(v) => v,
            ValueRef::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid_error(schema, format!("`{}` is not a FLOAT8: {}", s, e)))?,
            other => {
                return Err(invalid_error(
                    schema,
                    format!("cannot write {} as FLOAT8", other.type_name()),
                ))
            }
        }))
    }
}

impl WriterNative for i128 {
    fn convert(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i128>> {
        let (precision, scale) = match schema.data_type() {
            DataType::Decimal128(p, s) => (*p, *s),
            other => {
                return Err(invalid_error(
                    schema,
                    format!("decimal writer over non-decimal type {}", other),
                ))
            }
        };
        let pow = 10i128.pow(scale.max(0) as u32);
        let bound = 10i128.pow(precision as u32);
        let scaled = match value {
            ValueRef::Null => return Ok(Converted::Null),
            ValueRef::Int(v) => (v as i128) * pow,
            ValueRef::Long(v) => (v as i128)
                .checked_mul(pow)
                .ok_or_else(|| overflow_error(schema, v, "DECIMAL"))?,
            ValueRef::Double(v) => (v * pow as f64)
                .round()
                .to_i128()
                .ok_or_else(|| overflow_error(schema, v, "DECIMAL"))?,
            ValueRef::Str(s) => parse_decimal(schema, s, scale)?,
            other => {
                return Err(invalid_error(
                    schema,
                    format!("cannot write {} as DECIMAL", other.type_name()),
                ))
            }
        };
        if scaled.unsigned_abs() >= bound.unsigned_abs() {
            return Err(overflow_error(schema, format!("{:?}", value), "DECIMAL"));
        }
        Ok(Converted::Value(scaled))
    }
}

fn bigint_from(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i64>> {
    Ok(Converted::Value(match value {
        ValueRef::Null => return Ok(Converted::Null),
        ValueRef::Int(v) => v as i64,
        ValueRef::Long(v) => v,
        ValueRef::Double(v) => v
            .round()
            .to_i64()
            .ok_or_else(|| overflow_error(schema, v, "BIGINT"))?,
        ValueRef::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid_error(schema, format!("`{}` is not a BIGINT: {}", s, e)))?,
        other => {
            return Err(invalid_error(
                schema,
                format!("cannot write {} as BIGINT", other.type_name()),
            ))
        }
    }))
}

fn date64_from(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i64>> {
    Ok(Converted::Value(match value {
        ValueRef::Null => return Ok(Converted::Null),
        ValueRef::Int(v) => v as i64,
        ValueRef::Long(v) => v,
        ValueRef::Str(s) => {
            let format = schema.property(FORMAT_PROP).unwrap_or("%Y-%m-%d");
            let date = NaiveDate::parse_from_str(s.trim(), format)
                .map_err(|e| invalid_error(schema, format!("`{}` is not a DATE: {}", s, e)))?;
            date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
        }
        other => {
            return Err(invalid_error(
                schema,
                format!("cannot write {} as DATE", other.type_name()),
            ))
        }
    }))
}

fn timestamp_seconds_from(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<i64>> {
    Ok(Converted::Value(match value {
        ValueRef::Null => return Ok(Converted::Null),
        ValueRef::Int(v) => v as i64,
        ValueRef::Long(v) => v,
        ValueRef::Str(s) => {
            let s = s.trim();
            match schema.property(FORMAT_PROP) {
                Some(format) => NaiveDateTime::parse_from_str(s, format)
                    .map_err(|e| {
                        invalid_error(schema, format!("`{}` is not a TIMESTAMP: {}", s, e))
                    })?
                    .and_utc()
                    .timestamp(),
                None => DateTime::parse_from_rfc3339(s)
                    .map(|t| t.timestamp())
                    .or_else(|_| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                            .map(|t| t.and_utc().timestamp())
                    })
                    .map_err(|e| {
                        invalid_error(schema, format!("`{}` is not a TIMESTAMP: {}", s, e))
                    })?,
            }
        }
        other => {
            return Err(invalid_error(
                schema,
                format!("cannot write {} as TIMESTAMP", other.type_name()),
            ))
        }
    }))
}

pub(crate) fn bool_from(schema: &ColumnSchema, value: ValueRef<'_>) -> Result<Converted<bool>> {
    Ok(Converted::Value(match value {
        ValueRef::Null => return Ok(Converted::Null),
        ValueRef::Bool(v) => v,
        ValueRef::Str(s) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") => true,
            t if t.eq_ignore_ascii_case("false") => false,
            _ => return Err(invalid_error(schema, format!("`{}` is not a BOOLEAN", s))),
        },
        other => {
            return Err(invalid_error(
                schema,
                format!("cannot write {} as BOOLEAN", other.type_name()),
            ))
        }
    }))
}

fn parse_decimal(schema: &ColumnSchema, text: &str, scale: i8) -> Result<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid_error(schema, format!("`{}` is not a DECIMAL", text)));
    }
    let scale = scale.max(0) as usize;
    let mut value: i128 = 0;
    let mut push_digit = |c: char| -> Result<()> {
        let d = c
            .to_digit(10)
            .ok_or_else(|| invalid_error(schema, format!("`{}` is not a DECIMAL", text)))?;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as i128))
            .ok_or_else(|| overflow_error(schema, text, "DECIMAL"))?;
        Ok(())
    };
    for c in int_part.chars() {
        push_digit(c)?;
    }
    for c in frac_part.chars().take(scale) {
        push_digit(c)?;
    }
    // pad out to the declared scale when the literal is shorter
    for _ in frac_part.len().min(scale)..scale {
        value = value
            .checked_mul(10)
            .ok_or_else(|| overflow_error(schema, text, "DECIMAL"))?;
    }
    Ok(if negative { -value } else { value })
}
