use std::sync::Arc;

use arrow_array::{new_null_array, ArrayRef};

use rsf_core::errors::Result;
use rsf_core::schema::ColumnSchema;

use super::{ColumnWriter, ValueRef};

/// Writer for an unprojected column. Every mutation is accepted and
/// discarded, so readers may write without checking the projection mask.
pub struct DummyWriter {
    schema: Arc<ColumnSchema>,
}

impl DummyWriter {
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        Self { schema }
    }
}

impl ColumnWriter for DummyWriter {
    fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn is_projected(&self) -> bool {
        false
    }

    fn last_write_index(&self) -> isize {
        -1
    }

    fn bytes_used(&self) -> usize {
        0
    }

    fn set_value(&mut self, _index: usize, _value: ValueRef<'_>) -> Result<()> {
        Ok(())
    }

    fn save_entry(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn set_null_entry(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn roll_over(&mut self, _overflow_index: usize) -> Result<()> {
        Ok(())
    }

    fn in_overflow(&self) -> bool {
        true
    }

    fn harvest(&mut self, value_count: usize) -> Result<ArrayRef> {
        // Unprojected columns never reach the output container; this only
        // exists to keep the writer contract total.
        Ok(new_null_array(
            self.schema.to_field().data_type(),
            value_count,
        ))
    }
}
