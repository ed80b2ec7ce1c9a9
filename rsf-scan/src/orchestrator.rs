//! Wires the projection pipeline, the result set loader and the schema
//! smoother into a per-reader lifecycle consumed by the scan operator.

use std::sync::Arc;

use arrow_array::{new_empty_array, new_null_array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, SchemaRef};

use rsf_core::errors::Result;
use rsf_core::internal_err;
use rsf_core::schema::ColumnSchema;
use rsf_core::util::array_build::{new_constant_string_array, new_list_array};
use rsf_rowset::{shared_cache, LoaderOptions, ProjectionFilter, ResultSetLoader, SharedVectorCache};

use crate::file_meta::FileMetadata;
use crate::negotiator::SchemaNegotiator;
use crate::options::ScanOptions;
use crate::projection::{
    parse_scan_projection, resolve_file_projection, FileLevelProjection, ResolvedColumn,
    ResolvedSchema, ScanLevelProjection,
};
use crate::reader::RowBatchReader;
use crate::smoother::SchemaSmoother;
use rsf_core::schema::SchemaPath;

/// One output batch together with the schema version it was produced under.
pub struct ScanBatch {
    pub batch: RecordBatch,
    pub schema_version: u64,
}

struct ReaderState {
    loader: ResultSetLoader,
    file_projection: FileLevelProjection,
    file_meta: FileMetadata,
    /// Per-reader options; the negotiator may have overridden the null type.
    options: ScanOptions,
    late_schema: bool,
    resolved: Option<ResolvedSchema>,
    output_schema: Option<SchemaRef>,
    /// Loader schema version the current resolution was derived from.
    resolved_loader_version: u64,
    batches_emitted: usize,
    eof: bool,
}

/// Composes the projection phases, the loader and the smoother. The vector
/// cache survives across readers; one reader is active at a time.
pub struct ScanOrchestrator {
    options: ScanOptions,
    projection: ScanLevelProjection,
    cache: SharedVectorCache,
    smoother: SchemaSmoother,
    current: Option<ReaderState>,
}

impl ScanOrchestrator {
    pub fn new(options: ScanOptions, projection_list: &[SchemaPath]) -> Result<Self> {
        let projection = parse_scan_projection(projection_list, &options)?;
        let smoother = SchemaSmoother::new(&options);
        Ok(Self {
            options,
            projection,
            cache: shared_cache(),
            smoother,
            current: None,
        })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn projection(&self) -> &ScanLevelProjection {
        &self.projection
    }

    pub fn schema_version(&self) -> u64 {
        self.smoother.version()
    }

    /// True once the current reader has a resolved output schema.
    pub fn has_schema(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|state| state.resolved.is_some())
    }

    pub fn output_schema(&self) -> Option<SchemaRef> {
        self.current
            .as_ref()
            .and_then(|state| state.output_schema.clone())
    }

    /// Open a reader through a fresh schema negotiator. Returns false when
    /// the reader asked to be skipped; the caller closes it either way on
    /// failure paths.
    pub fn open_reader(&mut self, reader: &mut dyn RowBatchReader) -> Result<bool> {
        if self.current.is_some() {
            return internal_err!("a reader is already open");
        }
        let mut negotiator = SchemaNegotiator::new(&self.options, &self.projection);
        if !reader.open(&mut negotiator)? {
            return Ok(false);
        }
        let negotiated = negotiator.into_parts();
        let file_meta = FileMetadata::new(
            negotiated.file_path.clone(),
            negotiated.selection_root.clone(),
        )?;
        let file_projection = resolve_file_projection(&self.projection, &file_meta, &self.options);
        let reader_options = match &negotiated.null_type {
            Some(null_type) => self.options.with_null_type(null_type.clone()),
            None => self.options.clone(),
        };

        let loader_options = LoaderOptions::new()
            .with_max_rows(
                negotiated
                    .batch_size
                    .unwrap_or_else(|| reader_options.max_batch_rows()),
            )
            .with_max_bytes(reader_options.max_batch_bytes())
            .with_projection(self.loader_projection());
        let mut loader = ResultSetLoader::with_cache(loader_options, self.cache.clone());

        let late_schema = negotiated.is_late_schema();
        for column in negotiated.table_schema.iter() {
            loader.add_column((**column).clone())?;
        }

        let mut state = ReaderState {
            loader,
            file_projection,
            file_meta,
            options: reader_options,
            late_schema,
            resolved: None,
            output_schema: None,
            resolved_loader_version: 0,
            batches_emitted: 0,
            eof: false,
        };
        if !late_schema {
            let (resolved, _) = self.smoother.resolve(
                &state.file_projection,
                &negotiated.table_schema,
                &state.file_meta,
                &self.cache,
                &state.options,
            )?;
            state.output_schema = Some(resolved.to_arrow_schema());
            state.resolved = Some(resolved);
            state.resolved_loader_version = state.loader.schema_version();
        }
        self.current = Some(state);
        Ok(true)
    }

    /// Drive the current reader through one batch. `None` means the reader
    /// is exhausted and should be closed.
    pub fn read_batch(&mut self, reader: &mut dyn RowBatchReader) -> Result<Option<ScanBatch>> {
        let Some(state) = self.current.as_mut() else {
            return internal_err!("no reader is open");
        };

        if state.eof {
            // an overflow on the reader's last row leaves one batch behind
            if !state.loader.has_pending_rows() {
                return Ok(None);
            }
            state.loader.start_batch()?;
            let table_batch = state.loader.harvest()?;
            return Self::finish_batch(state, &mut self.smoother, &self.cache, table_batch);
        }

        state.loader.start_batch()?;
        let more = reader.next_batch(&mut state.loader)?;
        if !more {
            state.eof = true;
        }
        let table_batch = state.loader.harvest()?;

        if table_batch.num_rows() == 0
            && state.eof
            && !state.loader.has_pending_rows()
            && state.batches_emitted > 0
        {
            return Ok(None);
        }
        Self::finish_batch(state, &mut self.smoother, &self.cache, table_batch)
    }

    fn finish_batch(
        state: &mut ReaderState,
        smoother: &mut SchemaSmoother,
        cache: &SharedVectorCache,
        table_batch: RecordBatch,
    ) -> Result<Option<ScanBatch>> {
        // late-schema readers resolve against what the loader has actually
        // seen, re-checked whenever the loader schema grew
        let loader_version = state.loader.schema_version();
        if state.resolved.is_none()
            || (state.late_schema && loader_version != state.resolved_loader_version)
        {
            let table_schema = state.loader.writer_schema();
            let (resolved, changed) = smoother.resolve(
                &state.file_projection,
                &table_schema,
                &state.file_meta,
                cache,
                &state.options,
            )?;
            if changed || state.output_schema.is_none() {
                state.output_schema = Some(resolved.to_arrow_schema());
            }
            state.resolved = Some(resolved);
            state.resolved_loader_version = loader_version;
        }
        let Some(resolved) = state.resolved.as_ref() else {
            return internal_err!("batch read without a resolved schema");
        };
        let Some(output_schema) = state.output_schema.clone() else {
            return internal_err!("batch read without an output schema");
        };

        let rows = table_batch.num_rows();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(resolved.columns().len());
        for column in resolved.columns() {
            let array = match column {
                ResolvedColumn::Table { schema, .. } => {
                    match table_batch.column_by_name(schema.name()) {
                        Some(array) => array.clone(),
                        // declared after an overflow: absent from this batch
                        None => null_array_for(schema, rows)?,
                    }
                }
                ResolvedColumn::Null { schema } => null_array_for(schema, rows)?,
                ResolvedColumn::Constant { value, .. } => {
                    new_constant_string_array(value.as_deref(), rows)
                }
            };
            arrays.push(array);
        }
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        let batch = RecordBatch::try_new_with_options(output_schema, arrays, &options)?;
        state.batches_emitted += 1;
        Ok(Some(ScanBatch {
            batch,
            schema_version: smoother.version(),
        }))
    }

    /// Release the current reader's loader; the vector cache is retained
    /// for the next reader.
    pub fn close_reader(&mut self, reader: &mut dyn RowBatchReader) -> Result<()> {
        if let Some(mut state) = self.current.take() {
            state.loader.close();
        }
        reader.close()
    }

    fn loader_projection(&self) -> ProjectionFilter {
        if self.projection.project_all {
            return ProjectionFilter::All;
        }
        let names = self.projection.table_column_names();
        if names.is_empty() {
            ProjectionFilter::Empty
        } else {
            ProjectionFilter::names(names)
        }
    }
}

/// Materialise a column the reader did not provide: typed nulls, or empty
/// entries for a repeated column.
fn null_array_for(schema: &ColumnSchema, rows: usize) -> Result<ArrayRef> {
    let field = schema.to_field();
    if schema.is_array() {
        if let DataType::List(item) = field.data_type() {
            let values = new_empty_array(item.data_type());
            return new_list_array(item.clone(), vec![0; rows + 1], values, None);
        }
    }
    Ok(new_null_array(field.data_type(), rows))
}
