use std::collections::BTreeSet;
use std::path::PathBuf;

use arrow_schema::DataType;

use rsf_core::errors::Result;
use rsf_core::schema::{ColumnSchema, TupleSchema};
use rsf_core::user_schema_err;
use rsf_rowset::writers::is_supported_scalar;

use crate::options::ScanOptions;
use crate::projection::{ProjectedColumn, ScanLevelProjection, COLUMNS_ARRAY_NAME};

/// Whether the reader knows its schema at open time or discovers it while
/// reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Early,
    Late,
}

/// The handshake object a reader uses at open to declare its schema and
/// file identity, and to inspect the projection so it can skip unprojected
/// columns.
pub struct SchemaNegotiator<'a> {
    options: &'a ScanOptions,
    projection: &'a ScanLevelProjection,
    table_schema: TupleSchema,
    schema_type: Option<SchemaType>,
    file_path: Option<PathBuf>,
    selection_root: Option<PathBuf>,
    null_type: Option<DataType>,
    batch_size: Option<usize>,
}

impl<'a> SchemaNegotiator<'a> {
    pub(crate) fn new(options: &'a ScanOptions, projection: &'a ScanLevelProjection) -> Self {
        Self {
            options,
            projection,
            table_schema: TupleSchema::new(),
            schema_type: None,
            file_path: None,
            selection_root: None,
            null_type: None,
            batch_size: None,
        }
    }

    // ---- reader declarations -----------------------------------------

    pub fn add_table_column(&mut self, column: ColumnSchema) -> Result<usize> {
        if !column.is_map() && !is_supported_scalar(column.data_type()) {
            return user_schema_err!(
                "reader declared column `{}` with unsupported minor type {}",
                column.name(),
                column.data_type()
            );
        }
        self.table_schema.add(column)
    }

    pub fn set_table_schema_type(&mut self, schema_type: SchemaType) {
        self.schema_type = Some(schema_type);
    }

    pub fn set_file_path(&mut self, path: impl Into<PathBuf>) {
        self.file_path = Some(path.into());
    }

    pub fn set_selection_root(&mut self, path: impl Into<PathBuf>) {
        self.selection_root = Some(path.into());
    }

    /// Override the type of null columns created for projected columns this
    /// reader cannot provide.
    pub fn set_null_type(&mut self, null_type: DataType) {
        self.null_type = Some(null_type);
    }

    pub fn set_batch_size(&mut self, rows: usize) {
        self.batch_size = Some(rows);
    }

    // ---- projection queries ------------------------------------------

    pub fn options(&self) -> &ScanOptions {
        self.options
    }

    pub fn projection(&self) -> &ScanLevelProjection {
        self.projection
    }

    /// Whether a table column of this name reaches the output; readers may
    /// skip decoding columns that do not.
    pub fn is_projected(&self, name: &str) -> bool {
        if self.projection.project_all {
            return true;
        }
        self.projection.columns.iter().any(|c| match c {
            ProjectedColumn::Table(path) => path.root_matches(name),
            ProjectedColumn::ColumnsArray { .. } => name.eq_ignore_ascii_case(COLUMNS_ARRAY_NAME),
            _ => false,
        })
    }

    /// The selected indexes of the `columns` array, when restricted.
    pub fn columns_indices(&self) -> Option<&BTreeSet<usize>> {
        self.projection.columns.iter().find_map(|c| match c {
            ProjectedColumn::ColumnsArray {
                indices: Some(indices),
            } => Some(indices),
            _ => None,
        })
    }

    pub fn has_columns_array(&self) -> bool {
        self.projection.columns_array().is_some()
    }

    // ---- scan-side accessors -----------------------------------------

    pub(crate) fn into_parts(self) -> NegotiatedSchema {
        NegotiatedSchema {
            table_schema: self.table_schema,
            schema_type: self.schema_type,
            file_path: self.file_path,
            selection_root: self.selection_root,
            null_type: self.null_type,
            batch_size: self.batch_size,
        }
    }
}

pub(crate) struct NegotiatedSchema {
    pub table_schema: TupleSchema,
    pub schema_type: Option<SchemaType>,
    pub file_path: Option<PathBuf>,
    pub selection_root: Option<PathBuf>,
    pub null_type: Option<DataType>,
    pub batch_size: Option<usize>,
}

impl NegotiatedSchema {
    /// A reader that declared no columns discovers its schema while
    /// reading, unless it said otherwise.
    pub fn is_late_schema(&self) -> bool {
        match self.schema_type {
            Some(SchemaType::Early) => false,
            Some(SchemaType::Late) => true,
            None => self.table_schema.is_empty(),
        }
    }
}
