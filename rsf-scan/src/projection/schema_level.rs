//! Schema-level projection: bind the file-level projection to a reader's
//! table schema, yielding the fully resolved output schema.

use std::sync::Arc;

use arrow_schema::{DataType, Schema, SchemaRef};

use rsf_core::errors::Result;
use rsf_core::schema::{ColumnSchema, TupleSchema};
use rsf_core::user_schema_err;
use rsf_core::util::case_map::CaseInsensitiveMap;

use crate::options::ScanOptions;

use super::{ConstantOrigin, FileColumn, FileLevelProjection, COLUMNS_ARRAY_NAME};

/// How one output column is produced.
#[derive(Debug, Clone)]
pub enum ResolvedColumn {
    /// Projection of a reader column, by index into the table schema.
    Table {
        schema: Arc<ColumnSchema>,
        index: usize,
    },
    /// The reader does not provide the column; it is filled with nulls of
    /// the declared type.
    Null { schema: Arc<ColumnSchema> },
    /// A constant string value for this file.
    Constant {
        schema: Arc<ColumnSchema>,
        value: Option<String>,
        origin: ConstantOrigin,
    },
}

impl ResolvedColumn {
    pub fn schema(&self) -> &Arc<ColumnSchema> {
        match self {
            ResolvedColumn::Table { schema, .. } => schema,
            ResolvedColumn::Null { schema } => schema,
            ResolvedColumn::Constant { schema, .. } => schema,
        }
    }
}

/// The output schema of a reader: ordered resolved columns plus their
/// arrow rendition.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    columns: Vec<ResolvedColumn>,
    output: TupleSchema,
}

impl ResolvedSchema {
    pub(crate) fn new(columns: Vec<ResolvedColumn>) -> Result<Self> {
        let mut output = TupleSchema::new();
        for column in &columns {
            output.add_arc(column.schema().clone())?;
        }
        Ok(Self { columns, output })
    }

    pub fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    pub fn output(&self) -> &TupleSchema {
        &self.output
    }

    pub fn to_arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(self.output.to_fields()))
    }

    /// Number of partition constants in the output.
    pub fn partition_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    ResolvedColumn::Constant {
                        origin: ConstantOrigin::Partition(_),
                        ..
                    }
                )
            })
            .count()
    }
}

fn null_column(name: &str, options: &ScanOptions) -> ColumnSchema {
    ColumnSchema::optional(name, options.null_type().clone())
}

fn constant_column(name: &str) -> ColumnSchema {
    ColumnSchema::optional(name, DataType::Utf8)
}

/// Resolve the file-level projection against the reader's table schema.
pub fn resolve_schema(
    file_projection: &FileLevelProjection,
    table_schema: &TupleSchema,
    options: &ScanOptions,
) -> Result<ResolvedSchema> {
    // a wildcard must not re-emit explicitly projected columns
    let mut explicit: CaseInsensitiveMap<()> = CaseInsensitiveMap::new();
    for column in &file_projection.columns {
        if let FileColumn::Table(path) = column {
            explicit.insert(path.root(), ());
        }
    }

    let mut columns = Vec::new();
    for column in &file_projection.columns {
        match column {
            FileColumn::Table(path) => match table_schema.index_of(path.root()) {
                Some(index) => columns.push(ResolvedColumn::Table {
                    schema: table_schema.get(index).cloned().unwrap_or_else(|| {
                        Arc::new(null_column(path.root(), options))
                    }),
                    index,
                }),
                None => columns.push(ResolvedColumn::Null {
                    schema: Arc::new(null_column(path.root(), options)),
                }),
            },
            FileColumn::Wildcard => {
                for (index, column) in table_schema.iter().enumerate() {
                    if explicit.contains_key(column.name()) {
                        continue;
                    }
                    columns.push(ResolvedColumn::Table {
                        schema: column.clone(),
                        index,
                    });
                }
            }
            FileColumn::Constant {
                name,
                value,
                origin,
            } => columns.push(ResolvedColumn::Constant {
                schema: Arc::new(constant_column(name)),
                value: value.clone(),
                origin: *origin,
            }),
            FileColumn::ColumnsArray => match table_schema.index_of(COLUMNS_ARRAY_NAME) {
                Some(index) => columns.push(ResolvedColumn::Table {
                    schema: table_schema.get(index).cloned().unwrap_or_else(|| {
                        Arc::new(null_column(COLUMNS_ARRAY_NAME, options))
                    }),
                    index,
                }),
                None => {
                    return user_schema_err!(
                        "the reader does not provide the `{}` array",
                        COLUMNS_ARRAY_NAME
                    )
                }
            },
        }
    }
    ResolvedSchema::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_meta::FileMetadata;
    use crate::projection::{parse_scan_projection, resolve_file_projection};
    use rsf_core::schema::SchemaPath;

    fn table_schema() -> TupleSchema {
        TupleSchema::from_columns(vec![
            ColumnSchema::required("a", DataType::Int32),
            ColumnSchema::optional("b", DataType::Utf8),
        ])
        .unwrap()
    }

    fn resolve(list: &[&str], options: &ScanOptions) -> Result<ResolvedSchema> {
        let paths: Vec<SchemaPath> = list.iter().map(|s| SchemaPath::parse(s).unwrap()).collect();
        let scan = parse_scan_projection(&paths, options)?;
        let file = resolve_file_projection(&scan, &FileMetadata::none(), options);
        resolve_schema(&file, &table_schema(), options)
    }

    fn output_names(resolved: &ResolvedSchema) -> Vec<String> {
        resolved
            .output()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn test_explicit_binding() {
        let options = ScanOptions::default();
        let resolved = resolve(&["b", "a"], &options).unwrap();
        assert_eq!(output_names(&resolved), vec!["b", "a"]);
        assert!(matches!(
            resolved.columns()[0],
            ResolvedColumn::Table { index: 1, .. }
        ));
        assert!(matches!(
            resolved.columns()[1],
            ResolvedColumn::Table { index: 0, .. }
        ));
    }

    #[test]
    fn test_missing_column_becomes_typed_null() {
        let options = ScanOptions::default();
        let resolved = resolve(&["a", "b", "c"], &options).unwrap();
        match &resolved.columns()[2] {
            ResolvedColumn::Null { schema } => {
                assert_eq!(schema.data_type(), &DataType::Int32);
                assert!(schema.is_nullable());
            }
            other => panic!("expected null column, got {other:?}"),
        }
    }

    #[test]
    fn test_null_type_override() {
        let options = ScanOptions::builder().set_null_type(DataType::Utf8).build();
        let resolved = resolve(&["missing"], &options).unwrap();
        assert_eq!(
            resolved.columns()[0].schema().data_type(),
            &DataType::Utf8
        );
    }

    #[test]
    fn test_wildcard_expands_in_reader_order() {
        let options = ScanOptions::default();
        let resolved = resolve(&["*"], &options).unwrap();
        assert_eq!(output_names(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn test_wildcard_skips_explicit_columns() {
        let options = ScanOptions::default();
        let resolved = resolve(&["b", "*"], &options).unwrap();
        assert_eq!(output_names(&resolved), vec!["b", "a"]);
    }

    #[test]
    fn test_columns_array_requires_reader_support() {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        // table schema has no `columns` column
        assert!(resolve(&["columns"], &options).is_err());
    }
}
