//! Schema smoothing: reuse the prior reader's resolved schema when the new
//! reader's schema is compatible, so downstream operators do not see a
//! schema change at every file boundary.

use std::sync::Arc;

use rsf_core::errors::Result;
use rsf_core::schema::{DataMode, TupleSchema};

use crate::file_meta::FileMetadata;
use crate::options::ScanOptions;
use crate::projection::{
    resolve_schema, ConstantOrigin, FileLevelProjection, ResolvedColumn, ResolvedSchema,
};
use rsf_rowset::SharedVectorCache;

/// Holds the most recent resolved schema and decides, reader by reader,
/// between reusing it and replacing it. The schema version is bumped only
/// when the output schema actually changes.
pub struct SchemaSmoother {
    smoothing: bool,
    prior: Option<ResolvedSchema>,
    version: u64,
}

impl SchemaSmoother {
    pub fn new(options: &ScanOptions) -> Self {
        Self {
            smoothing: options.schema_smoothing(),
            prior: None,
            version: 0,
        }
    }

    /// Monotonic output schema version; 0 before the first resolution.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Resolve a reader's schema. Returns the resolution and whether the
    /// output schema changed from the previous reader.
    pub fn resolve(
        &mut self,
        file_projection: &FileLevelProjection,
        table_schema: &TupleSchema,
        meta: &FileMetadata,
        cache: &SharedVectorCache,
        options: &ScanOptions,
    ) -> Result<(ResolvedSchema, bool)> {
        if self.smoothing {
            if let Some(prior) = &self.prior {
                if let Some(reused) = try_reuse(prior, table_schema, meta, cache, options)? {
                    // reuse normally keeps the output schema bit-for-bit; a
                    // required column degrading to a typed null column still
                    // changes cardinality and must bump the version
                    let changed = !prior.output().is_equivalent(reused.output());
                    if changed {
                        self.version += 1;
                    } else {
                        log::debug!(
                            "schema smoothing kept prior schema at version {}",
                            self.version
                        );
                    }
                    self.prior = Some(reused.clone());
                    return Ok((reused, changed));
                }
            }
        }
        let resolved = resolve_schema(file_projection, table_schema, options)?;
        let changed = match &self.prior {
            Some(prior) => !prior.output().is_equivalent(resolved.output()),
            None => true,
        };
        if changed {
            self.version += 1;
        }
        self.prior = Some(resolved.clone());
        Ok((resolved, changed))
    }
}

/// Attempt to express the new reader schema in terms of the prior resolved
/// schema. `None` means incompatible: the caller replaces the schema.
fn try_reuse(
    prior: &ResolvedSchema,
    table_schema: &TupleSchema,
    meta: &FileMetadata,
    cache: &SharedVectorCache,
    options: &ScanOptions,
) -> Result<Option<ResolvedSchema>> {
    // every column of the new schema must be known to the prior schema
    for column in table_schema.iter() {
        if prior.output().find(column.name()).is_none() {
            return Ok(None);
        }
    }
    // legacy wildcard expansion: a deeper partition structure would need
    // more dirN columns than the prior schema carries
    if options.legacy_wildcard_expansion() && meta.partition_depth() > prior.partition_count() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(prior.columns().len());
    for resolved in prior.columns() {
        match resolved {
            ResolvedColumn::Table {
                schema: prior_schema,
                ..
            }
            | ResolvedColumn::Null {
                schema: prior_schema,
            } => match table_schema.index_of(prior_schema.name()) {
                Some(index) => {
                    let Some(new_schema) = table_schema.get(index) else {
                        return Ok(None);
                    };
                    if new_schema.data_type() != prior_schema.data_type() {
                        return Ok(None);
                    }
                    // identical modes, or required narrowing into the prior
                    // nullable column
                    let mode_ok = new_schema.mode() == prior_schema.mode()
                        || (prior_schema.mode() == DataMode::Optional
                            && new_schema.mode() == DataMode::Required);
                    if !mode_ok {
                        return Ok(None);
                    }
                    if let (Some(prior_precision), Some(new_precision)) =
                        (prior_schema.precision(), new_schema.precision())
                    {
                        if new_precision > prior_precision {
                            return Ok(None);
                        }
                    }
                    // prior case, mode and precision win; only the binding
                    // index tracks the new reader
                    columns.push(ResolvedColumn::Table {
                        schema: prior_schema.clone(),
                        index,
                    });
                }
                None => {
                    if prior_schema.mode() != DataMode::Required {
                        columns.push(ResolvedColumn::Null {
                            schema: prior_schema.clone(),
                        });
                    } else if cache.borrow().contains(prior_schema.name()) {
                        columns.push(ResolvedColumn::Null {
                            schema: Arc::new(prior_schema.with_mode(DataMode::Optional)),
                        });
                    } else {
                        return Ok(None);
                    }
                }
            },
            ResolvedColumn::Constant { schema, origin, .. } => {
                let value = match origin {
                    ConstantOrigin::Metadata(kind) => meta.metadata_value(*kind),
                    ConstantOrigin::Partition(depth) => meta.dir(*depth).map(|s| s.to_string()),
                };
                columns.push(ResolvedColumn::Constant {
                    schema: schema.clone(),
                    value,
                    origin: *origin,
                });
            }
        }
    }
    ResolvedSchema::new(columns).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{parse_scan_projection, resolve_file_projection};
    use arrow_schema::DataType;
    use rsf_core::schema::{ColumnSchema, SchemaPath};
    use rsf_rowset::shared_cache;

    fn smoothing_options() -> ScanOptions {
        ScanOptions::builder().set_schema_smoothing(true).build()
    }

    fn file_projection(list: &[&str], options: &ScanOptions) -> FileLevelProjection {
        let paths: Vec<SchemaPath> = list.iter().map(|s| SchemaPath::parse(s).unwrap()).collect();
        let scan = parse_scan_projection(&paths, options).unwrap();
        resolve_file_projection(&scan, &FileMetadata::none(), options)
    }

    fn two_column_schema() -> TupleSchema {
        TupleSchema::from_columns(vec![
            ColumnSchema::required("a", DataType::Int32),
            ColumnSchema::optional("b", DataType::Utf8),
        ])
        .unwrap()
    }

    #[test]
    fn test_same_schema_twice_keeps_version() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        let (_, changed) = smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        assert!(changed);
        assert_eq!(smoother.version(), 1);

        let (_, changed) = smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        assert!(!changed);
        assert_eq!(smoother.version(), 1);
    }

    #[test]
    fn test_missing_nullable_column_is_reused_as_null() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        let narrower =
            TupleSchema::from_columns(vec![ColumnSchema::required("a", DataType::Int32)]).unwrap();
        let (resolved, changed) = smoother
            .resolve(&projection, &narrower, &meta, &cache, &options)
            .unwrap();
        assert!(!changed);
        assert_eq!(smoother.version(), 1);
        assert_eq!(resolved.output().len(), 2);
        assert!(matches!(resolved.columns()[1], ResolvedColumn::Null { .. }));
    }

    #[test]
    fn test_missing_required_column_needs_cached_vector() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        let wide = TupleSchema::from_columns(vec![
            ColumnSchema::required("a", DataType::Int32),
            ColumnSchema::required("b", DataType::Utf8),
        ])
        .unwrap();
        let narrow =
            TupleSchema::from_columns(vec![ColumnSchema::required("a", DataType::Int32)]).unwrap();

        smoother
            .resolve(&projection, &wide, &meta, &cache, &options)
            .unwrap();
        // without a cached vector the required column forces a replace
        let (_, changed) = smoother
            .resolve(&projection, &narrow, &meta, &cache, &options)
            .unwrap();
        assert!(changed);
        assert_eq!(smoother.version(), 2);

        // re-establish the wide schema, then cache the vector
        smoother
            .resolve(&projection, &wide, &meta, &cache, &options)
            .unwrap();
        assert_eq!(smoother.version(), 3);
        cache
            .borrow_mut()
            .register(Arc::new(ColumnSchema::required("b", DataType::Utf8)));
        let (resolved, changed) = smoother
            .resolve(&projection, &narrow, &meta, &cache, &options)
            .unwrap();
        // the column order and types are kept, but required became nullable,
        // which is a schema change downstream
        assert!(changed);
        match &resolved.columns()[1] {
            ResolvedColumn::Null { schema } => {
                assert!(schema.is_nullable());
                assert_eq!(schema.data_type(), &DataType::Utf8);
            }
            other => panic!("expected typed null column, got {other:?}"),
        }
    }

    #[test]
    fn test_new_column_forces_replace() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        let narrow =
            TupleSchema::from_columns(vec![ColumnSchema::required("a", DataType::Int32)]).unwrap();
        smoother
            .resolve(&projection, &narrow, &meta, &cache, &options)
            .unwrap();
        let (_, changed) = smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        assert!(changed);
        assert_eq!(smoother.version(), 2);
    }

    #[test]
    fn test_type_change_forces_replace() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        let retyped = TupleSchema::from_columns(vec![
            ColumnSchema::required("a", DataType::Int64),
            ColumnSchema::optional("b", DataType::Utf8),
        ])
        .unwrap();
        let (_, changed) = smoother
            .resolve(&projection, &retyped, &meta, &cache, &options)
            .unwrap();
        assert!(changed);
    }

    #[test]
    fn test_required_narrowing_prefers_nullable_and_prior_case() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        // b arrives spelled differently and non-nullable; prior wins both
        let variant = TupleSchema::from_columns(vec![
            ColumnSchema::required("a", DataType::Int32),
            ColumnSchema::required("B", DataType::Utf8),
        ])
        .unwrap();
        let (resolved, changed) = smoother
            .resolve(&projection, &variant, &meta, &cache, &options)
            .unwrap();
        assert!(!changed);
        let b = resolved.output().get(1).unwrap();
        assert_eq!(b.name(), "b");
        assert!(b.is_nullable());
    }

    #[test]
    fn test_column_order_follows_prior() {
        let options = smoothing_options();
        let cache = shared_cache();
        let mut smoother = SchemaSmoother::new(&options);
        let projection = file_projection(&["*"], &options);
        let meta = FileMetadata::none();

        smoother
            .resolve(&projection, &two_column_schema(), &meta, &cache, &options)
            .unwrap();
        let permuted = TupleSchema::from_columns(vec![
            ColumnSchema::optional("b", DataType::Utf8),
            ColumnSchema::required("a", DataType::Int32),
        ])
        .unwrap();
        let (resolved, changed) = smoother
            .resolve(&projection, &permuted, &meta, &cache, &options)
            .unwrap();
        assert!(!changed);
        let names: Vec<_> = resolved.output().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(matches!(
            resolved.columns()[0],
            ResolvedColumn::Table { index: 1, .. }
        ));
    }
}
