//! Shared helpers for scan tests: mock readers with canned rows, and batch
//! comparison with a readable diff.

use std::cell::Cell as StdCell;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::rc::Rc;

use arrow::util::pretty::pretty_format_batches;
use arrow_array::RecordBatch;
use arrow_schema::DataType;

use rsf_core::errors::{Error, Result};
use rsf_core::schema::{ColumnSchema, DataMode};
use rsf_rowset::{ColumnHandle, ResultSetLoader};
use rsf_scan::negotiator::{SchemaNegotiator, SchemaType};
use rsf_scan::reader::{ReaderFactory, RowBatchReader, VecReaderFactory};

/// Assert two batches are equal by value, with a pretty-printed diff on
/// failure.
pub fn assert_batches_eq(expected: &RecordBatch, actual: &RecordBatch) {
    if expected == actual {
        return;
    }
    let expected_text = pretty_format_batches(std::slice::from_ref(expected))
        .map(|t| t.to_string())
        .unwrap_or_else(|e| format!("<unprintable: {e}>"));
    let actual_text = pretty_format_batches(std::slice::from_ref(actual))
        .map(|t| t.to_string())
        .unwrap_or_else(|e| format!("<unprintable: {e}>"));
    panic!("batches differ\nexpected:\n{expected_text}\nactual:\n{actual_text}");
}

/// One canned cell value for a mock reader.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bool(bool),
}

impl Cell {
    pub fn s(text: &str) -> Cell {
        Cell::Str(text.to_string())
    }

    fn write(&self, loader: &mut ResultSetLoader, handle: &ColumnHandle) -> Result<()> {
        match self {
            Cell::Null => loader.set_null(handle),
            Cell::Int(v) => loader.set_int(handle, *v),
            Cell::Long(v) => loader.set_long(handle, *v),
            Cell::Double(v) => loader.set_double(handle, *v),
            Cell::Str(v) => loader.set_string(handle, v),
            Cell::Bool(v) => loader.set_bool(handle, *v),
        }
    }
}

/// An early-schema reader over canned rows.
pub struct MockEarlyReader {
    schema: Vec<ColumnSchema>,
    rows: Vec<Vec<Cell>>,
    file_path: Option<PathBuf>,
    selection_root: Option<PathBuf>,
    batch_size: Option<usize>,
    handles: Vec<ColumnHandle>,
    cursor: usize,
}

impl MockEarlyReader {
    pub fn new(schema: Vec<ColumnSchema>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            schema,
            rows,
            file_path: None,
            selection_root: None,
            batch_size: None,
            handles: Vec::new(),
            cursor: 0,
        }
    }

    pub fn with_file(mut self, file_path: &str, selection_root: &str) -> Self {
        self.file_path = Some(PathBuf::from(file_path));
        self.selection_root = Some(PathBuf::from(selection_root));
        self
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    pub fn boxed(self) -> Box<dyn RowBatchReader> {
        Box::new(self)
    }
}

impl RowBatchReader for MockEarlyReader {
    fn open(&mut self, negotiator: &mut SchemaNegotiator<'_>) -> Result<bool> {
        negotiator.set_table_schema_type(SchemaType::Early);
        for column in &self.schema {
            negotiator.add_table_column(column.clone())?;
        }
        if let Some(path) = &self.file_path {
            negotiator.set_file_path(path.clone());
        }
        if let Some(root) = &self.selection_root {
            negotiator.set_selection_root(root.clone());
        }
        if let Some(rows) = self.batch_size {
            negotiator.set_batch_size(rows);
        }
        Ok(true)
    }

    fn next_batch(&mut self, loader: &mut ResultSetLoader) -> Result<bool> {
        if self.handles.is_empty() {
            for column in &self.schema {
                let handle = loader
                    .column(column.name())
                    .ok_or_else(|| Error::General(format!("column `{}` missing", column.name())))?;
                self.handles.push(handle);
            }
        }
        while self.cursor < self.rows.len() && !loader.is_full() {
            loader.start_row()?;
            for (handle, cell) in self.handles.iter().zip(&self.rows[self.cursor]) {
                cell.write(loader, handle)?;
            }
            loader.save_row()?;
            self.cursor += 1;
        }
        Ok(self.cursor < self.rows.len())
    }

}

/// A reader that opts into the `columns` array form: every row is a repeated
/// varchar. Unprojected indexes are left empty so projected ones keep their
/// positions; indexes past the last projected one are skipped entirely.
pub struct ColumnsArrayReader {
    rows: Vec<Vec<String>>,
    indices: Option<BTreeSet<usize>>,
    handle: Option<ColumnHandle>,
    cursor: usize,
}

impl ColumnsArrayReader {
    pub fn new(rows: Vec<Vec<&str>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|s| s.to_string()).collect())
                .collect(),
            indices: None,
            handle: None,
            cursor: 0,
        }
    }

    pub fn boxed(self) -> Box<dyn RowBatchReader> {
        Box::new(self)
    }
}

impl RowBatchReader for ColumnsArrayReader {
    fn open(&mut self, negotiator: &mut SchemaNegotiator<'_>) -> Result<bool> {
        negotiator.set_table_schema_type(SchemaType::Early);
        negotiator.add_table_column(ColumnSchema::new(
            "columns",
            DataType::Utf8,
            DataMode::Repeated,
        ))?;
        self.indices = negotiator.columns_indices().cloned();
        Ok(true)
    }

    fn next_batch(&mut self, loader: &mut ResultSetLoader) -> Result<bool> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => {
                let handle = loader
                    .column("columns")
                    .ok_or_else(|| Error::General("columns column missing".to_string()))?;
                self.handle = Some(handle.clone());
                handle
            }
        };
        let last_index = self
            .indices
            .as_ref()
            .and_then(|indices| indices.iter().next_back().copied());
        while self.cursor < self.rows.len() && !loader.is_full() {
            loader.start_row()?;
            for (i, value) in self.rows[self.cursor].iter().enumerate() {
                match (&self.indices, last_index) {
                    (Some(indices), Some(last)) => {
                        if i > last {
                            break;
                        }
                        let field = if indices.contains(&i) { value.as_str() } else { "" };
                        loader.append_array_value(&handle, rsf_rowset::ValueRef::Str(field))?;
                    }
                    _ => {
                        loader.append_array_value(&handle, rsf_rowset::ValueRef::Str(value))?;
                    }
                }
            }
            loader.finish_array(&handle)?;
            loader.save_row()?;
            self.cursor += 1;
        }
        Ok(self.cursor < self.rows.len())
    }
}

/// A fixed-list reader factory that counts how many times the scan closes
/// it. Scans are single-threaded, so a shared `Cell` is enough.
pub struct CountingFactory {
    inner: VecReaderFactory,
    closes: Rc<StdCell<usize>>,
}

impl CountingFactory {
    pub fn new(readers: Vec<Box<dyn RowBatchReader>>) -> (Self, Rc<StdCell<usize>>) {
        let closes = Rc::new(StdCell::new(0));
        (
            Self {
                inner: VecReaderFactory::new(readers),
                closes: closes.clone(),
            },
            closes,
        )
    }
}

impl ReaderFactory for CountingFactory {
    fn next_reader(&mut self) -> Result<Option<Box<dyn RowBatchReader>>> {
        self.inner.next_reader()
    }

    fn close(&mut self) -> Result<()> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// A reader that declines to open: no data, no schema.
pub struct SkippedReader;

impl RowBatchReader for SkippedReader {
    fn open(&mut self, _negotiator: &mut SchemaNegotiator<'_>) -> Result<bool> {
        Ok(false)
    }

    fn next_batch(&mut self, _loader: &mut ResultSetLoader) -> Result<bool> {
        Ok(false)
    }
}

/// A reader that opens with a schema and then fails on its first batch.
pub struct FailingReader {
    pub message: String,
}

impl RowBatchReader for FailingReader {
    fn open(&mut self, negotiator: &mut SchemaNegotiator<'_>) -> Result<bool> {
        negotiator.set_table_schema_type(SchemaType::Early);
        negotiator.add_table_column(ColumnSchema::required("a", DataType::Int32))?;
        Ok(true)
    }

    fn next_batch(&mut self, _loader: &mut ResultSetLoader) -> Result<bool> {
        Err(Error::General(self.message.clone()))
    }
}
