//! Row-oriented driver over a tuple of column writers.
//!
//! A reader writes one row at a time through the loader; the loader enforces
//! the batch row and byte limits and, when a row does not fit, splits it into
//! a lookahead batch so the completed rows can be harvested at the full batch
//! size. The reader never sees the split: it keeps writing and the loader
//! reports `is_full` after the row is saved.

use std::collections::HashSet;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchOptions};
use arrow_schema::{Fields, Schema};

use rsf_core::errors::{Error, Result};
use rsf_core::internal_err;
use rsf_core::schema::{ColumnSchema, TupleSchema};

use crate::cache::SharedVectorCache;
use crate::writers::{ColumnWriter, TupleWriter, ValueRef};

/// Hard cap on rows per batch, the largest offset a two-byte selection
/// vector can address.
pub const MAX_BATCH_ROWS: usize = 65_535;

pub const DEFAULT_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Which columns a batch reader should materialise.
#[derive(Debug, Clone)]
pub enum ProjectionFilter {
    /// Project every column the reader offers.
    All,
    /// Project no columns; the scan still counts rows.
    Empty,
    /// Project only the named columns (case-insensitive).
    Only(HashSet<String>),
}

impl ProjectionFilter {
    pub fn names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Only(names.into_iter().map(|n| n.to_lowercase()).collect())
    }

    pub fn is_projected(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Empty => false,
            Self::Only(names) => names.contains(&name.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    max_rows: usize,
    max_bytes: usize,
    projection: ProjectionFilter,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_rows: MAX_BATCH_ROWS,
            max_bytes: DEFAULT_BATCH_BYTES,
            projection: ProjectionFilter::All,
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.clamp(1, MAX_BATCH_ROWS);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionFilter) -> Self {
        self.projection = projection;
        self
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn projection(&self) -> &ProjectionFilter {
        &self.projection
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Member(usize),
    Element,
}

/// Opaque address of a writer in the loader's tree. Handles stay valid for
/// the life of the loader; they are not invalidated by batch boundaries.
#[derive(Debug, Clone)]
pub struct ColumnHandle {
    steps: Vec<Step>,
}

impl ColumnHandle {
    fn child(&self, step: Step) -> ColumnHandle {
        let mut steps = self.steps.clone();
        steps.push(step);
        ColumnHandle { steps }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Start,
    Batch,
    Harvested,
    Closed,
}

pub struct ResultSetLoader {
    options: LoaderOptions,
    root: TupleWriter,
    cache: Option<SharedVectorCache>,
    state: LoaderState,
    /// Index of the in-flight row within the active buffers.
    write_index: usize,
    /// Rows saved into the active buffers.
    batch_rows: usize,
    /// Rows saved after a roll_over; they open the next batch.
    pending_lookahead: usize,
    overflowed: bool,
    /// Completed rows frozen by the roll_over, exposed at harvest.
    harvest_rows: usize,
    batch_count: usize,
    total_rows: u64,
    version: u64,
}

impl ResultSetLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self::build(options, None)
    }

    pub fn with_cache(options: LoaderOptions, cache: SharedVectorCache) -> Self {
        Self::build(options, Some(cache))
    }

    fn build(options: LoaderOptions, cache: Option<SharedVectorCache>) -> Self {
        Self {
            options,
            root: TupleWriter::root(),
            cache,
            state: LoaderState::Start,
            write_index: 0,
            batch_rows: 0,
            pending_lookahead: 0,
            overflowed: false,
            harvest_rows: 0,
            batch_count: 0,
            total_rows: 0,
            version: 0,
        }
    }

    /// Monotonic per-loader schema version, bumped on every column addition.
    pub fn schema_version(&self) -> u64 {
        self.version
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The schema of every declared column, projected or not, as currently
    /// written.
    pub fn writer_schema(&self) -> TupleSchema {
        self.root
            .current_schema()
            .tuple()
            .cloned()
            .unwrap_or_default()
    }

    // ---- schema and addressing ---------------------------------------

    pub fn column(&self, name: &str) -> Option<ColumnHandle> {
        self.root.member_index(name).map(|id| ColumnHandle {
            steps: vec![Step::Member(id)],
        })
    }

    /// Add a top-level column. Unprojected columns get a no-op writer, so
    /// the caller may write to the handle unconditionally.
    pub fn add_column(&mut self, column: ColumnSchema) -> Result<ColumnHandle> {
        let projected = self.options.projection.is_projected(column.name());
        if projected {
            if let Some(cache) = &self.cache {
                cache.borrow_mut().register(Arc::new(column.clone()));
            }
        }
        let id = self.root.add_member(column, projected)?;
        self.version += 1;
        Ok(ColumnHandle {
            steps: vec![Step::Member(id)],
        })
    }

    /// Add a member to a map column.
    pub fn add_member(&mut self, parent: &ColumnHandle, column: ColumnSchema) -> Result<ColumnHandle> {
        let added = Self::apply(&mut self.root, &parent.steps, 0, &mut |node, _| {
            match node.as_tuple_mut() {
                Some(tuple) => tuple.add_member(column.clone(), true),
                None => internal_err!("cannot add a member to a non-map column"),
            }
        })?;
        self.version += 1;
        Ok(parent.child(Step::Member(added.unwrap_or(0))))
    }

    /// Handle of the element writer of an array column.
    pub fn element(&self, array: &ColumnHandle) -> ColumnHandle {
        array.child(Step::Element)
    }

    pub fn is_projected(&mut self, handle: &ColumnHandle) -> bool {
        matches!(
            Self::apply(&mut self.root, &handle.steps, 0, &mut |node, _| {
                Ok(node.is_projected())
            }),
            Ok(Some(true))
        )
    }

    // ---- batch lifecycle ---------------------------------------------

    pub fn start_batch(&mut self) -> Result<()> {
        match self.state {
            LoaderState::Start | LoaderState::Harvested => {}
            other => return internal_err!("start_batch in state {:?}", other),
        }
        self.batch_rows = self.pending_lookahead;
        self.pending_lookahead = 0;
        self.write_index = self.batch_rows;
        self.overflowed = false;
        self.harvest_rows = 0;
        self.state = LoaderState::Batch;
        Ok(())
    }

    pub fn start_row(&mut self) -> Result<()> {
        if self.state != LoaderState::Batch {
            return internal_err!("start_row outside a batch");
        }
        Ok(())
    }

    pub fn save_row(&mut self) -> Result<()> {
        if self.state != LoaderState::Batch {
            return internal_err!("save_row outside a batch");
        }
        self.batch_rows += 1;
        self.total_rows += 1;
        self.write_index = self.batch_rows;
        Ok(())
    }

    /// True once the batch hit its row limit or a row was split into the
    /// lookahead. The reader should stop and let the scan harvest.
    pub fn is_full(&self) -> bool {
        self.overflowed || self.batch_rows >= self.options.max_rows
    }

    /// Rows the harvested batch will carry.
    pub fn row_count(&self) -> usize {
        if self.overflowed {
            self.harvest_rows
        } else {
            self.batch_rows
        }
    }

    pub fn total_row_count(&self) -> u64 {
        self.total_rows
    }

    /// True when a harvested overflow left rows that will open the next
    /// batch.
    pub fn has_pending_rows(&self) -> bool {
        self.pending_lookahead > 0
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    // ---- row writing -------------------------------------------------

    pub fn set_value(&mut self, handle: &ColumnHandle, value: ValueRef<'_>) -> Result<()> {
        self.reserve(value.estimated_bytes())?;
        let index = self.write_index;
        Self::apply(&mut self.root, &handle.steps, index, &mut |node, i| {
            node.set_value(i, value)
        })
        .map(|_| ())
    }

    pub fn set_null(&mut self, handle: &ColumnHandle) -> Result<()> {
        self.set_value(handle, ValueRef::Null)
    }

    pub fn set_bool(&mut self, handle: &ColumnHandle, value: bool) -> Result<()> {
        self.set_value(handle, ValueRef::Bool(value))
    }

    pub fn set_int(&mut self, handle: &ColumnHandle, value: i32) -> Result<()> {
        self.set_value(handle, ValueRef::Int(value))
    }

    pub fn set_long(&mut self, handle: &ColumnHandle, value: i64) -> Result<()> {
        self.set_value(handle, ValueRef::Long(value))
    }

    pub fn set_double(&mut self, handle: &ColumnHandle, value: f64) -> Result<()> {
        self.set_value(handle, ValueRef::Double(value))
    }

    pub fn set_string(&mut self, handle: &ColumnHandle, value: &str) -> Result<()> {
        self.set_value(handle, ValueRef::Str(value))
    }

    pub fn set_bytes(&mut self, handle: &ColumnHandle, value: &[u8]) -> Result<()> {
        self.set_value(handle, ValueRef::Bytes(value))
    }

    /// Append one scalar element to an array column's in-flight entry.
    pub fn append_array_value(&mut self, handle: &ColumnHandle, value: ValueRef<'_>) -> Result<()> {
        self.reserve(value.estimated_bytes())?;
        Self::apply(&mut self.root, &handle.steps, self.write_index, &mut |node, _| {
            match node.as_array_mut() {
                Some(array) => array.append_element(value),
                None => internal_err!("append to a non-repeated column"),
            }
        })
        .map(|_| ())
    }

    /// Finalize an array column's entry for the current row.
    pub fn finish_array(&mut self, handle: &ColumnHandle) -> Result<()> {
        Self::apply(&mut self.root, &handle.steps, self.write_index, &mut |node, i| {
            node.save_entry(i)
        })
        .map(|_| ())
    }

    /// Finalize a map column's entry for the current row.
    pub fn finish_tuple(&mut self, handle: &ColumnHandle) -> Result<()> {
        Self::apply(&mut self.root, &handle.steps, self.write_index, &mut |node, i| {
            node.save_entry(i)
        })
        .map(|_| ())
    }

    /// Advance an array past a completed map or nested-array element.
    pub fn advance_array(&mut self, handle: &ColumnHandle) -> Result<()> {
        Self::apply(&mut self.root, &handle.steps, self.write_index, &mut |node, _| {
            match node.as_array_mut() {
                Some(array) => {
                    array.advance_element();
                    Ok(())
                }
                None => internal_err!("advance on a non-repeated column"),
            }
        })
        .map(|_| ())
    }

    // ---- harvest -----------------------------------------------------

    /// Close out the batch and expose it as the output container. With an
    /// overflow pending this returns the completed rows; the split row opens
    /// the next batch.
    pub fn harvest(&mut self) -> Result<RecordBatch> {
        if self.state != LoaderState::Batch {
            return internal_err!("harvest in state {:?}", self.state);
        }
        let row_count = self.row_count();
        let (fields, arrays, _) = self.root.harvest_members(row_count)?;
        let schema = Arc::new(Schema::new(Fields::from(fields)));
        let options = RecordBatchOptions::new().with_row_count(Some(row_count));
        let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;
        self.pending_lookahead = if self.overflowed { self.batch_rows } else { 0 };
        self.overflowed = false;
        self.state = LoaderState::Harvested;
        self.batch_count += 1;
        Ok(batch)
    }

    pub fn close(&mut self) {
        self.state = LoaderState::Closed;
    }

    // ---- internals ---------------------------------------------------

    fn reserve(&mut self, incoming: usize) -> Result<()> {
        if self.root.bytes_used() + incoming <= self.options.max_bytes {
            return Ok(());
        }
        if self.overflowed || self.write_index == 0 {
            return Err(Error::ResourceExhaustion(format!(
                "row too large: one row exceeds the batch byte limit of {} bytes",
                self.options.max_bytes
            )));
        }
        self.roll_over()
    }

    fn roll_over(&mut self) -> Result<()> {
        let n = self.write_index;
        log::debug!(
            "batch overflow at row {} with {} bytes in use",
            n,
            self.root.bytes_used()
        );
        self.root.roll_over(n)?;
        self.overflowed = true;
        self.harvest_rows = n;
        self.batch_rows = 0;
        self.write_index = 0;
        Ok(())
    }

    fn apply<R>(
        node: &mut dyn ColumnWriter,
        steps: &[Step],
        index: usize,
        f: &mut dyn FnMut(&mut dyn ColumnWriter, usize) -> Result<R>,
    ) -> Result<Option<R>> {
        if !node.is_projected() {
            return Ok(None);
        }
        match steps.first() {
            None => f(node, index).map(Some),
            Some(Step::Member(id)) => {
                let Some(tuple) = node.as_tuple_mut() else {
                    return internal_err!("path step into a non-map column");
                };
                Self::apply(tuple.member_mut(*id)?, &steps[1..], index, f)
            }
            Some(Step::Element) => {
                let Some(array) = node.as_array_mut() else {
                    return internal_err!("path step into a non-repeated column");
                };
                let element_index = array.next_element_index();
                Self::apply(array.element_mut(), &steps[1..], element_index, f)
            }
        }
    }
}

#[cfg(test)]
mod tests;
