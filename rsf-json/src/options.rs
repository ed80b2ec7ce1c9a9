use std::rc::Rc;

use arrow_schema::DataType;

/// Callback consulted when an all-null field must be typed at batch end.
/// Receives the dotted field path; `None` falls back to text-mode varchar.
pub type TypeHint = Rc<dyn Fn(&str) -> Option<DataType>>;

/// Configuration of the structural JSON parser. Immutable once built; see
/// [`JsonOptionsBuilder`].
#[derive(Clone)]
pub struct JsonOptions {
    /// Read every scalar as varchar, preserving the JSON textual form.
    all_text_mode: bool,
    /// Read every number as FLOAT8 rather than inferring BIGINT.
    read_numbers_as_double: bool,
    /// Accept NaN and Infinity literals.
    allow_nan_inf: bool,
    /// Recognise Mongo extended type wrappers such as `{"$numberInt": ...}`.
    extended_types: bool,
    /// Unwrap a top-level `[ ... ]` around the row objects.
    skip_outer_list: bool,
    /// Realise arrays of scalars as dense repeated vectors when possible.
    use_repeated_arrays: bool,
    /// Rows per batch, when the reader should override the scan default.
    batch_size: Option<usize>,
    type_hint: Option<TypeHint>,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl JsonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> JsonOptionsBuilder {
        JsonOptionsBuilder::with_defaults()
    }

    pub fn all_text_mode(&self) -> bool {
        self.all_text_mode
    }

    pub fn read_numbers_as_double(&self) -> bool {
        self.read_numbers_as_double
    }

    pub fn allow_nan_inf(&self) -> bool {
        self.allow_nan_inf
    }

    pub fn extended_types(&self) -> bool {
        self.extended_types
    }

    pub fn skip_outer_list(&self) -> bool {
        self.skip_outer_list
    }

    pub fn use_repeated_arrays(&self) -> bool {
        self.use_repeated_arrays
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn type_hint(&self) -> Option<&TypeHint> {
        self.type_hint.as_ref()
    }
}

pub struct JsonOptionsBuilder {
    all_text_mode: bool,
    read_numbers_as_double: bool,
    allow_nan_inf: bool,
    extended_types: bool,
    skip_outer_list: bool,
    use_repeated_arrays: bool,
    batch_size: Option<usize>,
    type_hint: Option<TypeHint>,
}

impl JsonOptionsBuilder {
    /// Returns default state of the builder.
    pub fn with_defaults() -> Self {
        Self {
            all_text_mode: false,
            read_numbers_as_double: false,
            allow_nan_inf: false,
            extended_types: false,
            skip_outer_list: false,
            use_repeated_arrays: false,
            batch_size: None,
            type_hint: None,
        }
    }

    /// Finalizes the configuration and returns immutable parser options.
    pub fn build(self) -> JsonOptions {
        JsonOptions {
            all_text_mode: self.all_text_mode,
            read_numbers_as_double: self.read_numbers_as_double,
            allow_nan_inf: self.allow_nan_inf,
            extended_types: self.extended_types,
            skip_outer_list: self.skip_outer_list,
            use_repeated_arrays: self.use_repeated_arrays,
            batch_size: self.batch_size,
            type_hint: self.type_hint,
        }
    }

    pub fn set_all_text_mode(mut self, enabled: bool) -> Self {
        self.all_text_mode = enabled;
        self
    }

    pub fn set_read_numbers_as_double(mut self, enabled: bool) -> Self {
        self.read_numbers_as_double = enabled;
        self
    }

    pub fn set_allow_nan_inf(mut self, enabled: bool) -> Self {
        self.allow_nan_inf = enabled;
        self
    }

    pub fn set_extended_types(mut self, enabled: bool) -> Self {
        self.extended_types = enabled;
        self
    }

    pub fn set_skip_outer_list(mut self, enabled: bool) -> Self {
        self.skip_outer_list = enabled;
        self
    }

    pub fn set_use_repeated_arrays(mut self, enabled: bool) -> Self {
        self.use_repeated_arrays = enabled;
        self
    }

    pub fn set_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    pub fn set_type_hint(mut self, hint: TypeHint) -> Self {
        self.type_hint = Some(hint);
        self
    }
}
