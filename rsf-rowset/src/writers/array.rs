use std::sync::Arc;

use arrow_array::ArrayRef;
use arrow_schema::Field;

use rsf_core::errors::Result;
use rsf_core::internal_err;
use rsf_core::schema::{ColumnSchema, DataMode};
use rsf_core::util::array_build::new_list_array;

use crate::convert::invalid_error;
use crate::vector::BitBuffer;

use super::{create_column_writer, create_scalar_writer, ColumnWriter, TupleWriter, ValueRef};

/// Writer for a repeated column: per-row offsets into an element writer.
///
/// The element writer sees element indexes, not row indexes; overflow
/// recursion rebases at the element index where the overflow row begins.
/// Dense repeated arrays have non-null entries and elements; the generic
/// list realisation makes both nullable.
pub struct ArrayWriter {
    schema: Arc<ColumnSchema>,
    offsets: Vec<i32>,
    validity: Option<BitBuffer>,
    element: Box<dyn ColumnWriter>,
    next_element: usize,
    last_write: isize,
    overflow: Option<ArraySnapshot>,
}

struct ArraySnapshot {
    offsets: Vec<i32>,
    validity: Option<BitBuffer>,
}

impl ArrayWriter {
    pub fn try_new(schema: Arc<ColumnSchema>) -> Result<Self> {
        let element_mode = if schema.elements_nullable() {
            DataMode::Optional
        } else {
            DataMode::Required
        };
        let element: Box<dyn ColumnWriter> = if let Some(el) = schema.element() {
            create_column_writer(Arc::new(el.clone()), true)?
        } else {
            let elem_schema = Arc::new(schema.with_mode(element_mode));
            if schema.is_map() {
                Box::new(TupleWriter::for_column(elem_schema)?)
            } else {
                create_scalar_writer(elem_schema)?
            }
        };
        let validity = schema.elements_nullable().then(BitBuffer::new);
        Ok(Self {
            schema,
            offsets: vec![0],
            validity,
            element,
            next_element: 0,
            last_write: -1,
            overflow: None,
        })
    }

    fn entry_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Append one scalar element to the entry being written.
    pub fn append_element(&mut self, value: ValueRef<'_>) -> Result<()> {
        self.element.set_value(self.next_element, value)?;
        self.next_element += 1;
        Ok(())
    }

    /// The element writer, for arrays of maps or arrays of arrays. The
    /// caller writes the element at [`ArrayWriter::next_element_index`] and
    /// then calls [`ArrayWriter::advance_element`].
    pub fn element_mut(&mut self) -> &mut dyn ColumnWriter {
        self.element.as_mut()
    }

    pub fn next_element_index(&self) -> usize {
        self.next_element
    }

    pub fn advance_element(&mut self) {
        self.next_element += 1;
    }

    fn fill_missing_entries(&mut self, index: usize) {
        while self.entry_count() < index {
            let last = *self.offsets.last().unwrap_or(&0);
            self.offsets.push(last);
            if let Some(validity) = &mut self.validity {
                validity.push(false);
            }
        }
    }
}

impl ColumnWriter for ArrayWriter {
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn last_write_index(&self) -> isize {
        self.last_write
    }

    fn bytes_used(&self) -> usize {
        self.offsets.len() * std::mem::size_of::<i32>()
            + self.validity.as_ref().map_or(0, BitBuffer::bytes_used)
            + self.element.bytes_used()
    }

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        match value {
            ValueRef::Null => self.set_null_entry(index),
            other => Err(invalid_error(
                &self.schema,
                format!("cannot write a bare {} to a repeated column", other.type_name()),
            )),
        }
    }

    fn save_entry(&mut self, index: usize) -> Result<()> {
        self.fill_missing_entries(index);
        let end = self.next_element as i32;
        if self.entry_count() == index {
            self.offsets.push(end);
            if let Some(validity) = &mut self.validity {
                validity.push(true);
            }
        } else if self.entry_count() == index + 1 {
            self.offsets[index + 1] = end;
            if let Some(validity) = &mut self.validity {
                validity.set(index, true);
            }
        } else {
            return internal_err!(
                "out of order entry on repeated column `{}`",
                self.schema.name()
            );
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn set_null_entry(&mut self, index: usize) -> Result<()> {
        if self.validity.is_none() {
            return Err(invalid_error(
                &self.schema,
                "null entry written to a dense repeated column",
            ));
        }
        self.fill_missing_entries(index);
        if self.entry_count() == index {
            let last = *self.offsets.last().unwrap_or(&0);
            self.offsets.push(last);
            if let Some(validity) = &mut self.validity {
                validity.push(false);
            }
        } else if self.entry_count() == index + 1 {
            if let Some(validity) = &mut self.validity {
                validity.set(index, false);
            }
        } else {
            return internal_err!(
                "out of order entry on repeated column `{}`",
                self.schema.name()
            );
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn as_array_mut(&mut self) -> Option<&mut ArrayWriter> {
        Some(self)
    }

    fn roll_over(&mut self, overflow_index: usize) -> Result<()> {
        if self.overflow.is_some() {
            return internal_err!("double overflow on column `{}`", self.schema.name());
        }
        let count = self.entry_count();
        // element index where the overflow row begins
        let base = if count > overflow_index {
            self.offsets[overflow_index]
        } else {
            *self.offsets.last().unwrap_or(&0)
        };
        self.element.roll_over(base as usize)?;
        let tail_offsets: Vec<i32> = if count > overflow_index {
            self.offsets[overflow_index..]
                .iter()
                .map(|o| o - base)
                .collect()
        } else {
            vec![0]
        };
        let mut main_offsets = std::mem::replace(&mut self.offsets, tail_offsets);
        main_offsets.truncate(overflow_index + 1);
        let main_validity = self.validity.as_mut().map(|validity| {
            let tail = validity.split_off(overflow_index);
            std::mem::replace(validity, tail)
        });
        self.overflow = Some(ArraySnapshot {
            offsets: main_offsets,
            validity: main_validity,
        });
        self.next_element -= base as usize;
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
        let (mut offsets, validity) = match self.overflow.take() {
            Some(snapshot) => (snapshot.offsets, snapshot.validity),
            None => {
                let offsets = std::mem::replace(&mut self.offsets, vec![0]);
                let validity = self
                    .validity
                    .as_mut()
                    .map(|v| std::mem::replace(v, BitBuffer::new()));
                self.next_element = 0;
                self.last_write = -1;
                (offsets, validity)
            }
        };
        if offsets.len() > value_count + 1 {
            offsets.truncate(value_count + 1);
        }
        let last = *offsets.last().unwrap_or(&0);
        while offsets.len() < value_count + 1 {
            offsets.push(last);
        }
        let element_count = *offsets.last().unwrap_or(&0) as usize;
        let values = self.element.harvest(element_count)?;
        // item nullability must agree with the declared field
        let item = Arc::new(Field::new(
            "item",
            values.data_type().clone(),
            self.schema.elements_nullable(),
        ));
        let nulls = validity.map(|v| v.into_nulls(value_count));
        new_list_array(item, offsets, values, nulls)
    }

    fn current_schema(&self) -> ColumnSchema {
        let mut schema = (*self.schema).clone();
        if self.schema.is_map() {
            if let Some(members) = self.element.current_schema().tuple() {
                schema = schema.with_members(members.clone());
            }
        }
        schema
    }
}
