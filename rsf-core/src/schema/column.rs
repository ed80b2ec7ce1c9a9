use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, FieldRef, Fields};

use super::tuple::TupleSchema;

/// Cardinality of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Required,
    Optional,
    Repeated,
}

/// Property key that selects the text format temporal writers parse with.
pub const FORMAT_PROP: &str = "format";

/// Metadata for one column: name, minor type, cardinality, and the optional
/// nested structure for maps and arrays.
///
/// For an array the minor type describes the element; for a map the members
/// live in `tuple` and the minor type is a bare struct marker. Equality used
/// for schema comparison is [`ColumnSchema::is_equivalent`]: name
/// (case-insensitive), minor type, cardinality and precision.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    name: String,
    data_type: DataType,
    mode: DataMode,
    precision: Option<u32>,
    scale: Option<i32>,
    /// Members of a map column.
    tuple: Option<TupleSchema>,
    /// Element of an array whose element is itself an array or a map.
    element: Option<Box<ColumnSchema>>,
    element_nullable: bool,
    properties: HashMap<String, String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, mode: DataMode) -> Self {
        Self {
            name: name.into(),
            data_type,
            mode,
            precision: None,
            scale: None,
            tuple: None,
            element: None,
            element_nullable: false,
            properties: HashMap::new(),
        }
    }

    pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, DataMode::Required)
    }

    pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, DataMode::Optional)
    }

    pub fn repeated(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, DataMode::Repeated)
    }

    pub fn map(name: impl Into<String>, mode: DataMode, members: TupleSchema) -> Self {
        let mut col = Self::new(name, DataType::Struct(Fields::empty()), mode);
        col.tuple = Some(members);
        col
    }

    /// An array whose element is itself an array or a map.
    pub fn repeated_complex(name: impl Into<String>, element: ColumnSchema) -> Self {
        let mut col = Self::new(name, element.data_type.clone(), DataMode::Repeated);
        col.element = Some(Box::new(element));
        col
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Arrays realised as a generic list have nullable elements; dense
    /// repeated arrays do not.
    pub fn with_nullable_elements(mut self, nullable: bool) -> Self {
        self.element_nullable = nullable;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn precision(&self) -> Option<u32> {
        self.precision
    }

    pub fn scale(&self) -> Option<i32> {
        self.scale
    }

    pub fn is_nullable(&self) -> bool {
        self.mode == DataMode::Optional
    }

    pub fn is_array(&self) -> bool {
        self.mode == DataMode::Repeated
    }

    pub fn is_map(&self) -> bool {
        self.tuple.is_some()
    }

    pub fn tuple(&self) -> Option<&TupleSchema> {
        self.tuple.as_ref()
    }

    pub fn element(&self) -> Option<&ColumnSchema> {
        self.element.as_deref()
    }

    pub fn elements_nullable(&self) -> bool {
        self.element_nullable
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }

    /// Copy of this column under another name. Used when flattening nested
    /// schemas into dotted leaf names.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }

    /// Copy of this column with another cardinality.
    pub fn with_mode(&self, mode: DataMode) -> Self {
        let mut copy = self.clone();
        copy.mode = mode;
        copy
    }

    /// Replace the member tuple of a map column.
    pub fn with_members(mut self, members: TupleSchema) -> Self {
        self.tuple = Some(members);
        self
    }

    /// Structural equality: case-insensitive name, minor type, cardinality
    /// and precision, recursing into map members and array elements.
    pub fn is_equivalent(&self, other: &ColumnSchema) -> bool {
        if !self.name.eq_ignore_ascii_case(&other.name)
            || self.data_type != other.data_type
            || self.mode != other.mode
            || self.precision != other.precision
        {
            return false;
        }
        match (&self.tuple, &other.tuple) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => return false,
            (Some(_), None) | (None, Some(_)) => return false,
            _ => {}
        }
        match (&self.element, &other.element) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => return false,
            (Some(_), None) | (None, Some(_)) => return false,
            _ => {}
        }
        true
    }

    /// The Arrow field this column presents to downstream operators.
    /// Repeated columns surface as a non-nullable list.
    pub fn to_field(&self) -> FieldRef {
        let base = match &self.tuple {
            Some(members) => DataType::Struct(members.to_fields()),
            None => self.data_type.clone(),
        };
        let field = match self.mode {
            DataMode::Required => Field::new(&self.name, base, false),
            DataMode::Optional => Field::new(&self.name, base, true),
            DataMode::Repeated => {
                let item = match &self.element {
                    Some(element) => {
                        let inner = element.to_field();
                        Field::new("item", inner.data_type().clone(), self.element_nullable)
                    }
                    None => Field::new("item", base, self.element_nullable),
                };
                Field::new(&self.name, DataType::List(Arc::new(item)), false)
            }
        };
        Arc::new(field)
    }
}
