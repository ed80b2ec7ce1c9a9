use std::sync::Arc;

use arrow_array::{ArrayRef, StructArray};
use arrow_buffer::NullBuffer;
use arrow_schema::{Field, FieldRef, Fields};

use rsf_core::errors::Result;
use rsf_core::schema::{ColumnSchema, DataMode, TupleSchema};
use rsf_core::util::array_build::new_struct_array;
use rsf_core::util::case_map::CaseInsensitiveMap;
use rsf_core::{internal_err, user_schema_err};

use crate::convert::invalid_error;
use crate::vector::BitBuffer;

use super::{create_column_writer, ColumnWriter, ValueRef};

/// Writer for a tuple of columns: the loader root, or a map column. Members
/// share the tuple's value index; new members may be added at any time.
pub struct TupleWriter {
    schema: Arc<ColumnSchema>,
    members: Vec<Box<dyn ColumnWriter>>,
    index: CaseInsensitiveMap<usize>,
    validity: Option<BitBuffer>,
    last_write: isize,
    /// Validity snapshot between roll_over and harvest. `Some(None)` marks a
    /// required tuple in overflow.
    overflow: Option<Option<BitBuffer>>,
}

impl TupleWriter {
    /// The row tuple at the root of a result set. It has no column schema of
    /// its own and no validity.
    pub fn root() -> Self {
        let schema = Arc::new(ColumnSchema::map("", DataMode::Required, TupleSchema::new()));
        Self {
            schema,
            members: Vec::new(),
            index: CaseInsensitiveMap::new(),
            validity: None,
            last_write: -1,
            overflow: None,
        }
    }

    pub fn for_column(schema: Arc<ColumnSchema>) -> Result<Self> {
        let validity = schema.is_nullable().then(BitBuffer::new);
        let mut writer = Self {
            schema: schema.clone(),
            members: Vec::new(),
            index: CaseInsensitiveMap::new(),
            validity,
            last_write: -1,
            overflow: None,
        };
        if let Some(members) = schema.tuple() {
            for column in members.iter() {
                writer.add_member((**column).clone(), true)?;
            }
        }
        Ok(writer)
    }

    pub fn add_member(&mut self, column: ColumnSchema, projected: bool) -> Result<usize> {
        if self.index.contains_key(column.name()) {
            return user_schema_err!("duplicate column name `{}`", column.name());
        }
        let writer = create_column_writer(Arc::new(column), projected)?;
        let id = self.members.len();
        self.index.insert(writer.schema().name().to_string(), id);
        self.members.push(writer);
        Ok(id)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, id: usize) -> Option<&dyn ColumnWriter> {
        self.members.get(id).map(|m| m.as_ref())
    }

    pub fn member_mut(&mut self, id: usize) -> Result<&mut dyn ColumnWriter> {
        match self.members.get_mut(id) {
            Some(member) => Ok(member.as_mut()),
            None => internal_err!("tuple member {} does not exist", id),
        }
    }

    /// Harvest every projected member that belongs to the outgoing batch.
    /// Members added after an overflow have no snapshot to harvest; they
    /// stay hidden until the lookahead batch.
    pub(crate) fn harvest_members(
        &mut self,
        value_count: usize,
    ) -> Result<(Vec<FieldRef>, Vec<ArrayRef>, Option<NullBuffer>)> {
        let snapshot = self.overflow.take();
        let in_overflow = snapshot.is_some();
        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        for member in &mut self.members {
            if !member.is_projected() {
                continue;
            }
            if in_overflow && !member.in_overflow() {
                continue;
            }
            let array = member.harvest(value_count)?;
            // nullability must agree with the declared field
            fields.push(Arc::new(Field::new(
                member.schema().name(),
                array.data_type().clone(),
                member.schema().is_nullable(),
            )));
            arrays.push(array);
        }
        let validity = match snapshot {
            Some(validity) => validity,
            None => {
                self.last_write = -1;
                self.validity
                    .as_mut()
                    .map(|v| std::mem::replace(v, BitBuffer::new()))
            }
        };
        Ok((fields, arrays, validity.map(|v| v.into_nulls(value_count))))
    }
}

impl ColumnWriter for TupleWriter {
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn last_write_index(&self) -> isize {
        self.last_write
    }

    fn bytes_used(&self) -> usize {
        self.members.iter().map(|m| m.bytes_used()).sum::<usize>()
            + self.validity.as_ref().map_or(0, BitBuffer::bytes_used)
    }

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        match value {
            ValueRef::Null => self.set_null_entry(index),
            other => Err(invalid_error(
                &self.schema,
                format!("cannot write a bare {} to a map column", other.type_name()),
            )),
        }
    }

    fn save_entry(&mut self, index: usize) -> Result<()> {
        if let Some(validity) = &mut self.validity {
            validity.fill_to(index, false);
            if validity.len() == index {
                validity.push(true);
            } else {
                validity.set(index, true);
            }
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn set_null_entry(&mut self, index: usize) -> Result<()> {
        let Some(validity) = &mut self.validity else {
            return Err(invalid_error(
                &self.schema,
                "null entry written to a non-nullable map column",
            ));
        };
        validity.fill_to(index, false);
        if validity.len() == index {
            validity.push(false);
        } else {
            validity.set(index, false);
        }
        self.last_write = index as isize;
        Ok(())
    }

    fn as_tuple_mut(&mut self) -> Option<&mut TupleWriter> {
        Some(self)
    }

    fn roll_over(&mut self, overflow_index: usize) -> Result<()> {
        if self.overflow.is_some() {
            return internal_err!("double overflow on column `{}`", self.schema.name());
        }
        for member in &mut self.members {
            member.roll_over(overflow_index)?;
        }
        let main_validity = self.validity.as_mut().map(|validity| {
            let tail = validity.split_off(overflow_index);
            std::mem::replace(validity, tail)
        });
        self.overflow = Some(main_validity);
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
        let (fields, arrays, nulls) = self.harvest_members(value_count)?;
        if fields.is_empty() {
            return Ok(Arc::new(StructArray::new_empty_fields(value_count, nulls)));
        }
        new_struct_array(Fields::from(fields), arrays, nulls)
    }

    fn current_schema(&self) -> ColumnSchema {
        let mut members = TupleSchema::new();
        for member in &self.members {
            // Members were deduplicated at add time.
            let _ = members.add(member.current_schema());
        }
        (*self.schema).clone().with_members(members)
    }
}
