use std::sync::Arc;

use arrow_array::{types::ArrowPrimitiveType, ArrayRef};

use rsf_core::errors::{Error, Result};
use rsf_core::internal_err;
use rsf_core::schema::ColumnSchema;
use rsf_core::util::array_build::{new_binary_array, new_bool_array, new_primitive_array, new_string_array};

use crate::convert::{bool_from, invalid_error, Converted, WriterNative};
use crate::vector::BitBuffer;

use super::{ColumnWriter, ValueRef};

/// Writer for fixed-width columns backed by a native-value buffer and an
/// optional validity buffer.
pub struct PrimitiveWriter<T: ArrowPrimitiveType> {
    schema: Arc<ColumnSchema>,
    values: Vec<T::Native>,
    validity: Option<BitBuffer>,
    last_write: isize,
    overflow: Option<PrimitiveSnapshot<T::Native>>,
}

struct PrimitiveSnapshot<N> {
    values: Vec<N>,
    validity: Option<BitBuffer>,
}

impl<T: ArrowPrimitiveType> PrimitiveWriter<T> {
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        let validity = schema.is_nullable().then(BitBuffer::new);
        Self {
            schema,
            values: Vec::new(),
            validity,
            last_write: -1,
            overflow: None,
        }
    }
}

impl<T: ArrowPrimitiveType> ColumnWriter for PrimitiveWriter<T>
where
    T::Native: WriterNative,
{
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn last_write_index(&self) -> isize {
        self.last_write
    }

    fn bytes_used(&self) -> usize {
        self.values.len() * std::mem::size_of::<T::Native>()
            + self.validity.as_ref().map_or(0, BitBuffer::bytes_used)
    }

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        let converted = T::Native::convert(&self.schema, value)?;
        while self.values.len() < index {
            self.values.push(T::Native::default());
            if let Some(validity) = &mut self.validity {
                validity.push(false);
            }
        }
        let (native, valid) = match converted {
            Converted::Value(v) => (v, true),
            Converted::Null => {
                if self.validity.is_none() {
                    return Err(invalid_error(
                        &self.schema,
                        "null written to a non-nullable column",
                    ));
                }
                (T::Native::default(), false)
            }
        };
        if index == self.values.len() {
            self.values.push(native);
            if let Some(validity) = &mut self.validity {
                validity.push(valid);
            }
        } else if index + 1 == self.values.len() {
            self.values[index] = native;
            if let Some(validity) = &mut self.validity {
                validity.set(index, valid);
            }
        } else {
            return internal_err!("out of order write to column `{}`", self.schema.name());
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn roll_over(&mut self, overflow_index: usize) -> Result<()> {
        if self.overflow.is_some() {
            return internal_err!("double overflow on column `{}`", self.schema.name());
        }
        let tail_values = if self.values.len() > overflow_index {
            self.values.split_off(overflow_index)
        } else {
            Vec::new()
        };
        let main_values = std::mem::replace(&mut self.values, tail_values);
        let main_validity = self.validity.as_mut().map(|validity| {
            let tail = validity.split_off(overflow_index);
            std::mem::replace(validity, tail)
        });
        self.overflow = Some(PrimitiveSnapshot {
            values: main_values,
            validity: main_validity,
        });
        self.last_write = if self.last_write >= overflow_index as isize {
            self.last_write - overflow_index as isize
        } else {
            -1
        };
        Ok(())
    }

    fn in_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    fn harvest(&mut self, value_count: usize) -> Result<ArrayRef> {
        let (mut values, validity) = match self.overflow.take() {
            Some(snapshot) => (snapshot.values, snapshot.validity),
            None => {
                let values = std::mem::take(&mut self.values);
                let validity = self
                    .validity
                    .as_mut()
                    .map(|v| std::mem::replace(v, BitBuffer::new()));
                self.last_write = -1;
                (values, validity)
            }
        };
        values.resize(value_count, T::Native::default());
        let nulls = validity.map(|v| v.into_nulls(value_count));
        new_primitive_array::<T>(values, nulls, self.schema.data_type())
    }
}

/// Writer for BOOLEAN columns; values live in a bit buffer of their own.
pub struct BoolWriter {
    schema: Arc<ColumnSchema>,
    values: BitBuffer,
    validity: Option<BitBuffer>,
    last_write: isize,
    overflow: Option<(BitBuffer, Option<BitBuffer>)>,
}

impl BoolWriter {
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        let validity = schema.is_nullable().then(BitBuffer::new);
        Self {
            schema,
            values: BitBuffer::new(),
            validity,
            last_write: -1,
            overflow: None,
        }
    }
}

impl ColumnWriter for BoolWriter {
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn last_write_index(&self) -> isize {
        self.last_write
    }

    fn bytes_used(&self) -> usize {
        self.values.bytes_used() + self.validity.as_ref().map_or(0, BitBuffer::bytes_used)
    }

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        let converted = bool_from(&self.schema, value)?;
        self.values.fill_to(index, false);
        if let Some(validity) = &mut self.validity {
            validity.fill_to(index, false);
        }
        let (bit, valid) = match converted {
            Converted::Value(v) => (v, true),
            Converted::Null => {
                if self.validity.is_none() {
                    return Err(invalid_error(
                        &self.schema,
                        "null written to a non-nullable column",
                    ));
                }
                (false, false)
            }
        };
        if index == self.values.len() {
            self.values.push(bit);
            if let Some(validity) = &mut self.validity {
                validity.push(valid);
            }
        } else if index + 1 == self.values.len() {
            self.values.set(index, bit);
            if let Some(validity) = &mut self.validity {
                validity.set(index, valid);
            }
        } else {
            return internal_err!("out of order write to column `{}`", self.schema.name());
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn roll_over(&mut self, overflow_index: usize) -> Result<()> {
        if self.overflow.is_some() {
            return internal_err!("double overflow on column `{}`", self.schema.name());
        }
        let tail_values = self.values.split_off(overflow_index);
        let main_values = std::mem::replace(&mut self.values, tail_values);
        let main_validity = self.validity.as_mut().map(|validity| {
            let tail = validity.split_off(overflow_index);
            std::mem::replace(validity, tail)
        });
        self.overflow = Some((main_values, main_validity));
        self.last_write = if self.last_write >= overflow_index as isize {
            self.last_write - overflow_index as isize
        } else {
            -1
        };
        Ok(())
    }

    fn in_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    fn harvest(&mut self, value_count: usize) -> Result<ArrayRef> {
        let (values, validity) = match self.overflow.take() {
            Some(snapshot) => snapshot,
            None => {
                let values = std::mem::replace(&mut self.values, BitBuffer::new());
                let validity = self
                    .validity
                    .as_mut()
                    .map(|v| std::mem::replace(v, BitBuffer::new()));
                self.last_write = -1;
                (values, validity)
            }
        };
        let nulls = validity.map(|v| v.into_nulls(value_count));
        new_bool_array(values.finish(value_count, false), nulls)
    }
}

/// Writer for VARCHAR and VARBINARY columns: an offsets buffer plus a data
/// buffer, with the usual optional validity buffer.
pub struct VarWidthWriter {
    schema: Arc<ColumnSchema>,
    binary: bool,
    offsets: Vec<i32>,
    data: Vec<u8>,
    validity: Option<BitBuffer>,
    last_write: isize,
    overflow: Option<VarSnapshot>,
}

struct VarSnapshot {
    offsets: Vec<i32>,
    data: Vec<u8>,
    validity: Option<BitBuffer>,
}

impl VarWidthWriter {
    pub fn varchar(schema: Arc<ColumnSchema>) -> Self {
        Self::new(schema, false)
    }

    pub fn varbinary(schema: Arc<ColumnSchema>) -> Self {
        Self::new(schema, true)
    }

    fn new(schema: Arc<ColumnSchema>, binary: bool) -> Self {
        let validity = schema.is_nullable().then(BitBuffer::new);
        Self {
            schema,
            binary,
            offsets: vec![0],
            data: Vec::new(),
            validity,
            last_write: -1,
            overflow: None,
        }
    }

    fn value_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn target_name(&self) -> &'static str {
        if self.binary {
            "VARBINARY"
        } else {
            "VARCHAR"
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data.len() + bytes.len() > i32::MAX as usize {
            return Err(Error::ResourceExhaustion(format!(
                "column `{}` exceeds the 2 GiB buffer limit",
                self.schema.name()
            )));
        }
        self.data.extend_from_slice(bytes);
        self.offsets.push(self.data.len() as i32);
        Ok(())
    }
}

impl ColumnWriter for VarWidthWriter {
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn last_write_index(&self) -> isize {
        self.last_write
    }

    fn bytes_used(&self) -> usize {
        self.data.len()
            + self.offsets.len() * std::mem::size_of::<i32>()
            + self.validity.as_ref().map_or(0, BitBuffer::bytes_used)
    }

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        let owned: Option<String> = match value {
            ValueRef::Bool(v) if !self.binary => Some(v.to_string()),
            ValueRef::Int(v) if !self.binary => Some(v.to_string()),
            ValueRef::Long(v) if !self.binary => Some(v.to_string()),
            ValueRef::Double(v) if !self.binary => Some(v.to_string()),
            _ => None,
        };
        let bytes: Option<&[u8]> = match (&value, &owned) {
            (ValueRef::Null, _) => None,
            (ValueRef::Str(s), _) => Some(s.as_bytes()),
            (ValueRef::Bytes(b), _) if self.binary => Some(*b),
            (_, Some(text)) => Some(text.as_bytes()),
            _ => {
                return Err(invalid_error(
                    &self.schema,
                    format!("cannot write {} as {}", value.type_name(), self.target_name()),
                ))
            }
        };
        if bytes.is_none() && self.validity.is_none() {
            return Err(invalid_error(
                &self.schema,
                "null written to a non-nullable column",
            ));
        }

        while self.value_count() < index {
            let last = *self.offsets.last().unwrap_or(&0);
            self.offsets.push(last);
            if let Some(validity) = &mut self.validity {
                validity.push(false);
            }
        }
        if index + 1 == self.value_count() {
            // rewrite of the in-flight value
            let start = self.offsets[index] as usize;
            self.data.truncate(start);
            self.offsets.truncate(index + 1);
            if let Some(validity) = &mut self.validity {
                validity.set(index, bytes.is_some());
            }
            match bytes {
                Some(b) => self.push_bytes(b)?,
                None => {
                    let last = *self.offsets.last().unwrap_or(&0);
                    self.offsets.push(last);
                }
            }
        } else if index == self.value_count() {
            match bytes {
                Some(b) => self.push_bytes(b)?,
                None => {
                    let last = *self.offsets.last().unwrap_or(&0);
                    self.offsets.push(last);
                }
            }
            if let Some(validity) = &mut self.validity {
                validity.push(bytes.is_some());
            }
        } else {
            return internal_err!("out of order write to column `{}`", self.schema.name());
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn roll_over(&mut self, overflow_index: usize) -> Result<()> {
        if self.overflow.is_some() {
            return internal_err!("double overflow on column `{}`", self.schema.name());
        }
        let count = self.value_count();
        let (tail_offsets, tail_data) = if count > overflow_index {
            let base = self.offsets[overflow_index];
            let tail_data = self.data.split_off(base as usize);
            let tail_offsets: Vec<i32> =
                self.offsets[overflow_index..].iter().map(|o| o - base).collect();
            (tail_offsets, tail_data)
        } else {
            (vec![0], Vec::new())
        };
        let mut main_offsets = std::mem::replace(&mut self.offsets, tail_offsets);
        main_offsets.truncate(overflow_index + 1);
        let main_data = std::mem::replace(&mut self.data, tail_data);
        let main_validity = self.validity.as_mut().map(|validity| {
            let tail = validity.split_off(overflow_index);
            std::mem::replace(validity, tail)
        });
        self.overflow = Some(VarSnapshot {
            offsets: main_offsets,
            data: main_data,
            validity: main_validity,
        });
        self.last_write = if self.last_write >= overflow_index as isize {
            self.last_write - overflow_index as isize
        } else {
            -1
        };
        Ok(())
    }

    fn in_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    fn harvest(&mut self, value_count: usize) -> Result<ArrayRef> {
        let (mut offsets, mut data, validity) = match self.overflow.take() {
            Some(snapshot) => (snapshot.offsets, snapshot.data, snapshot.validity),
            None => {
                let offsets = std::mem::replace(&mut self.offsets, vec![0]);
                let data = std::mem::take(&mut self.data);
                let validity = self
                    .validity
                    .as_mut()
                    .map(|v| std::mem::replace(v, BitBuffer::new()));
                self.last_write = -1;
                (offsets, data, validity)
            }
        };
        if offsets.len() > value_count + 1 {
            offsets.truncate(value_count + 1);
            data.truncate(*offsets.last().unwrap_or(&0) as usize);
        }
        let last = *offsets.last().unwrap_or(&0);
        while offsets.len() < value_count + 1 {
            offsets.push(last);
        }
        let nulls = validity.map(|v| v.into_nulls(value_count));
        if self.binary {
            new_binary_array(offsets, data, nulls)
        } else {
            new_string_array(offsets, data, nulls)
        }
    }
}
