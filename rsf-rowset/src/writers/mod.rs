//! Typed per-column writers over backing buffers.
//!
//! Each writer owns the active buffers of one column plus, after a batch
//! overflow, a harvestable snapshot of the buffers that belonged to the
//! completed rows. The loader coordinates row indexes and overflow; writers
//! only know value indexes.

use std::sync::Arc;

use arrow_array::ArrayRef;
use arrow_schema::DataType;

use rsf_core::errors::Result;
use rsf_core::schema::ColumnSchema;
use rsf_core::{internal_err, nyi_err, writer_scalar_types};

mod array;
mod dummy;
mod scalar;
mod tuple;

pub use array::ArrayWriter;
pub use dummy::DummyWriter;
pub use scalar::{BoolWriter, PrimitiveWriter, VarWidthWriter};
pub use tuple::TupleWriter;

/// A borrowed scalar value on its way into a column writer.
#[derive(Debug, Clone, Copy)]
pub enum ValueRef<'a> {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl ValueRef<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueRef::Null => "NULL",
            ValueRef::Bool(_) => "BOOLEAN",
            ValueRef::Int(_) => "INT",
            ValueRef::Long(_) => "BIGINT",
            ValueRef::Double(_) => "FLOAT8",
            ValueRef::Str(_) => "VARCHAR",
            ValueRef::Bytes(_) => "VARBINARY",
        }
    }

    /// Upper bound on the bytes this value adds to a batch, counting offset
    /// and validity overhead.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            ValueRef::Null | ValueRef::Bool(_) => 1,
            ValueRef::Int(_) => 4,
            ValueRef::Long(_) | ValueRef::Double(_) => 8,
            ValueRef::Str(s) => s.len() + 5,
            ValueRef::Bytes(b) => b.len() + 5,
        }
    }
}

/// One column's writer. Value indexes are row indexes for top-level columns,
/// array element indexes below a repeated level.
pub trait ColumnWriter {
    fn schema(&self) -> &Arc<ColumnSchema>;

    /// When false every mutation is a no-op and readers may skip decoding
    /// the column entirely.
    fn is_projected(&self) -> bool {
        true
    }

    /// Index of the most recently written value, -1 before the first write.
    fn last_write_index(&self) -> isize;

    fn bytes_used(&self) -> usize;

    fn set_value(&mut self, index: usize, value: ValueRef<'_>) -> Result<()>;

    /// Finalize an array or map entry at the given index.
    fn save_entry(&mut self, index: usize) -> Result<()> {
        let _ = index;
        internal_err!("writer for `{}` does not take entries", self.schema().name())
    }

    /// Record a null array or map entry at the given index.
    fn set_null_entry(&mut self, index: usize) -> Result<()> {
        let _ = index;
        internal_err!("writer for `{}` does not take entries", self.schema().name())
    }

    fn as_tuple_mut(&mut self) -> Option<&mut TupleWriter> {
        None
    }

    fn as_array_mut(&mut self) -> Option<&mut ArrayWriter> {
        None
    }

    /// Split off the values at `overflow_index` and beyond into a fresh set
    /// of lookahead buffers and make them active, leaving the completed rows
    /// behind as the harvestable batch. At most one value moves.
    fn roll_over(&mut self, overflow_index: usize) -> Result<()>;

    /// True between a roll_over and the harvest that consumes its snapshot.
    fn in_overflow(&self) -> bool;

    /// Produce the column's array for the batch being harvested, padded out
    /// to `value_count` values: zero values for required columns, nulls for
    /// optional ones, empty entries for repeated ones.
    fn harvest(&mut self, value_count: usize) -> Result<ArrayRef>;

    /// The column schema as currently written, including members added to
    /// maps after the writer was created.
    fn current_schema(&self) -> ColumnSchema {
        (**self.schema()).clone()
    }
}

/// Build the writer tree for a column. Unprojected columns get a writer that
/// accepts and discards every value.
pub fn create_column_writer(
    schema: Arc<ColumnSchema>,
    projected: bool,
) -> Result<Box<dyn ColumnWriter>> {
    if !projected {
        return Ok(Box::new(DummyWriter::new(schema)));
    }
    if schema.is_array() {
        return Ok(Box::new(ArrayWriter::try_new(schema)?));
    }
    if schema.is_map() {
        return Ok(Box::new(TupleWriter::for_column(schema)?));
    }
    create_scalar_writer(schema)
}

pub(crate) fn create_scalar_writer(schema: Arc<ColumnSchema>) -> Result<Box<dyn ColumnWriter>> {
    use arrow_array::types::{
        Date64Type, Decimal128Type, Float64Type, Int32Type, Int64Type, TimestampSecondType,
    };
    Ok(match schema.data_type() {
        DataType::Boolean => Box::new(BoolWriter::new(schema)),
        DataType::Int32 => Box::new(PrimitiveWriter::<Int32Type>::new(schema)),
        DataType::Int64 => Box::new(PrimitiveWriter::<Int64Type>::new(schema)),
        DataType::Float64 => Box::new(PrimitiveWriter::<Float64Type>::new(schema)),
        DataType::Date64 => Box::new(PrimitiveWriter::<Date64Type>::new(schema)),
        DataType::Timestamp(arrow_schema::TimeUnit::Second, _) => {
            Box::new(PrimitiveWriter::<TimestampSecondType>::new(schema))
        }
        DataType::Decimal128(_, _) => Box::new(PrimitiveWriter::<Decimal128Type>::new(schema)),
        DataType::Utf8 => Box::new(VarWidthWriter::varchar(schema)),
        DataType::Binary => Box::new(VarWidthWriter::varbinary(schema)),
        other => return nyi_err!(format!("column writer for type {}", other)),
    })
}

/// True when a writer can be built for the minor type.
pub fn is_supported_scalar(data_type: &DataType) -> bool {
    match data_type {
        DataType::Timestamp(unit, _) => *unit == arrow_schema::TimeUnit::Second,
        writer_scalar_types!() => true,
        _ => false,
    }
}
