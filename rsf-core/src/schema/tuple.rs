use std::sync::Arc;

use arrow_schema::{Fields, Schema};

use crate::errors::Result;
use crate::user_schema_err;
use crate::util::case_map::CaseInsensitiveMap;

use super::column::ColumnSchema;

/// An ordered list of columns with case-insensitive name lookup. Insertion
/// order is preserved for iteration and for structural comparison.
#[derive(Debug, Clone, Default)]
pub struct TupleSchema {
    columns: Vec<Arc<ColumnSchema>>,
    index: CaseInsensitiveMap<usize>,
}

impl TupleSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: impl IntoIterator<Item = ColumnSchema>) -> Result<Self> {
        let mut schema = Self::new();
        for column in columns {
            schema.add(column)?;
        }
        Ok(schema)
    }

    /// Append a column and return its id. Rejects a name already present
    /// under case-insensitive comparison.
    pub fn add(&mut self, column: ColumnSchema) -> Result<usize> {
        self.add_arc(Arc::new(column))
    }

    pub fn add_arc(&mut self, column: Arc<ColumnSchema>) -> Result<usize> {
        if self.index.contains_key(column.name()) {
            return user_schema_err!("duplicate column name `{}`", column.name());
        }
        let id = self.columns.len();
        self.index.insert(column.name().to_string(), id);
        self.columns.push(column);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<ColumnSchema>> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: usize) -> Option<&Arc<ColumnSchema>> {
        self.columns.get(id)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ColumnSchema>> {
        self.columns.iter()
    }

    /// Pre-order walk over the leaves, yielding a flat schema whose column
    /// names are dotted paths. Arrays count as leaves; map members recurse.
    pub fn flatten(&self) -> TupleSchema {
        let mut out = TupleSchema::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut TupleSchema) {
        for column in &self.columns {
            let name = if prefix.is_empty() {
                column.name().to_string()
            } else {
                format!("{}.{}", prefix, column.name())
            };
            match column.tuple() {
                Some(members) if !column.is_array() => members.flatten_into(&name, out),
                _ => {
                    // Flattening never introduces duplicates when the input
                    // tuple was built through `add`.
                    let _ = out.add(column.renamed(name));
                }
            }
        }
    }

    /// Structural, order-sensitive equivalence.
    pub fn is_equivalent(&self, other: &TupleSchema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.is_equivalent(b))
    }

    pub fn to_fields(&self) -> Fields {
        self.columns.iter().map(|c| c.to_field()).collect()
    }

    pub fn to_arrow_schema(&self) -> Schema {
        Schema::new(self.to_fields())
    }
}
