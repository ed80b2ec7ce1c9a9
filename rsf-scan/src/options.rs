use arrow_schema::DataType;

use rsf_rowset::{DEFAULT_BATCH_BYTES, MAX_BATCH_ROWS};

pub const DEFAULT_MAX_BATCH_ROWS: usize = MAX_BATCH_ROWS; // vector hard cap
pub const DEFAULT_MAX_BATCH_BYTES: usize = DEFAULT_BATCH_BYTES; // 16 MiB
pub const DEFAULT_NULL_TYPE: DataType = DataType::Int32;

/// Scan-wide configuration. Immutable once built; see
/// [`ScanOptionsBuilder`].
#[derive(Clone)]
pub struct ScanOptions {
    /// Upper bound on rows per output batch. 64Ki-1 by default.
    max_batch_rows: usize,
    /// Upper bound on bytes per output batch. 16MB by default.
    max_batch_bytes: usize,
    /// A wildcard also projects the partition columns of every file.
    legacy_wildcard_expansion: bool,
    /// With legacy expansion, put partition columns at the wildcard position
    /// rather than after the table columns.
    legacy_partition_column_location: bool,
    /// Minimum partition depth to expand under the legacy wildcard.
    partition_depth_hint: Option<u8>,
    /// Minor type of the null column created for a projected column the
    /// reader does not provide. Always nullable.
    null_type: DataType,
    /// Reuse the prior reader's resolved schema when compatible.
    schema_smoothing: bool,
    /// A scan whose factory yields no readers returns no schema instead of
    /// failing.
    allow_empty_scan: bool,
    /// The reader understands the `columns` array form.
    enable_columns_array: bool,
    /// The wildcard expands to the `columns` array rather than to named
    /// columns.
    wildcard_expands_columns: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::with_defaults()
    }

    pub fn max_batch_rows(&self) -> usize {
        self.max_batch_rows
    }

    pub fn max_batch_bytes(&self) -> usize {
        self.max_batch_bytes
    }

    pub fn legacy_wildcard_expansion(&self) -> bool {
        self.legacy_wildcard_expansion
    }

    pub fn legacy_partition_column_location(&self) -> bool {
        self.legacy_partition_column_location
    }

    pub fn partition_depth_hint(&self) -> Option<u8> {
        self.partition_depth_hint
    }

    pub fn null_type(&self) -> &DataType {
        &self.null_type
    }

    /// Copy of these options with another null column type, as negotiated
    /// by a reader.
    pub fn with_null_type(&self, null_type: DataType) -> Self {
        let mut options = self.clone();
        options.null_type = null_type;
        options
    }

    pub fn schema_smoothing(&self) -> bool {
        self.schema_smoothing
    }

    pub fn allow_empty_scan(&self) -> bool {
        self.allow_empty_scan
    }

    pub fn enable_columns_array(&self) -> bool {
        self.enable_columns_array
    }

    pub fn wildcard_expands_columns(&self) -> bool {
        self.wildcard_expands_columns
    }
}

pub struct ScanOptionsBuilder {
    max_batch_rows: usize,
    max_batch_bytes: usize,
    legacy_wildcard_expansion: bool,
    legacy_partition_column_location: bool,
    partition_depth_hint: Option<u8>,
    null_type: DataType,
    schema_smoothing: bool,
    allow_empty_scan: bool,
    enable_columns_array: bool,
    wildcard_expands_columns: bool,
}

impl ScanOptionsBuilder {
    /// Returns default state of the builder.
    pub fn with_defaults() -> Self {
        Self {
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            legacy_wildcard_expansion: false,
            legacy_partition_column_location: false,
            partition_depth_hint: None,
            null_type: DEFAULT_NULL_TYPE,
            schema_smoothing: false,
            allow_empty_scan: false,
            enable_columns_array: false,
            wildcard_expands_columns: false,
        }
    }

    /// Finalizes the configuration and returns immutable scan options.
    pub fn build(self) -> ScanOptions {
        ScanOptions {
            max_batch_rows: self.max_batch_rows.clamp(1, DEFAULT_MAX_BATCH_ROWS),
            max_batch_bytes: self.max_batch_bytes,
            legacy_wildcard_expansion: self.legacy_wildcard_expansion,
            legacy_partition_column_location: self.legacy_partition_column_location,
            partition_depth_hint: self.partition_depth_hint,
            null_type: self.null_type,
            schema_smoothing: self.schema_smoothing,
            allow_empty_scan: self.allow_empty_scan,
            enable_columns_array: self.enable_columns_array,
            wildcard_expands_columns: self.wildcard_expands_columns,
        }
    }

    pub fn set_max_batch_rows(mut self, max_batch_rows: usize) -> Self {
        self.max_batch_rows = max_batch_rows;
        self
    }

    pub fn set_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    pub fn set_legacy_wildcard_expansion(mut self, enabled: bool) -> Self {
        self.legacy_wildcard_expansion = enabled;
        self
    }

    pub fn set_legacy_partition_column_location(mut self, enabled: bool) -> Self {
        self.legacy_partition_column_location = enabled;
        self
    }

    pub fn set_partition_depth_hint(mut self, depth: u8) -> Self {
        self.partition_depth_hint = Some(depth);
        self
    }

    pub fn set_null_type(mut self, null_type: DataType) -> Self {
        self.null_type = null_type;
        self
    }

    pub fn set_schema_smoothing(mut self, enabled: bool) -> Self {
        self.schema_smoothing = enabled;
        self
    }

    pub fn set_allow_empty_scan(mut self, enabled: bool) -> Self {
        self.allow_empty_scan = enabled;
        self
    }

    pub fn set_enable_columns_array(mut self, enabled: bool) -> Self {
        self.enable_columns_array = enabled;
        self
    }

    pub fn set_wildcard_expands_columns(mut self, enabled: bool) -> Self {
        self.wildcard_expands_columns = enabled;
        self
    }
}
