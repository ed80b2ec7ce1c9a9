//! The projection resolution pipeline: scan-level parsing of the project
//! list, file-level filling of implicit and partition columns, and
//! schema-level resolution against a reader's table schema.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;

use rsf_core::schema::SchemaPath;
use rsf_core::util::case_map::CaseInsensitiveMap;

mod file_level;
mod scan_level;
mod schema_level;

pub use file_level::{resolve_file_projection, ConstantOrigin, FileColumn, FileLevelProjection};
pub use scan_level::{parse_scan_projection, ScanLevelProjection};
pub use schema_level::{resolve_schema, ResolvedColumn, ResolvedSchema};

/// Name of the special array column some readers expose in place of named
/// columns.
pub const COLUMNS_ARRAY_NAME: &str = "columns";

/// Largest index accepted in a `columns[n]` projection entry.
pub const MAX_COLUMNS_INDEX: usize = 64 * 1024;

/// Implicit columns whose value derives from the file's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMetadataKind {
    Fqn,
    FilePath,
    FileName,
    Suffix,
}

lazy_static! {
    static ref FILE_METADATA_NAMES: CaseInsensitiveMap<FileMetadataKind> = {
        let mut names = CaseInsensitiveMap::new();
        names.insert("fqn", FileMetadataKind::Fqn);
        names.insert("filepath", FileMetadataKind::FilePath);
        names.insert("filename", FileMetadataKind::FileName);
        names.insert("suffix", FileMetadataKind::Suffix);
        names
    };
}

impl FileMetadataKind {
    pub fn from_name(name: &str) -> Option<FileMetadataKind> {
        FILE_METADATA_NAMES.get(name).copied()
    }

    pub fn column_name(self) -> &'static str {
        match self {
            FileMetadataKind::Fqn => "fqn",
            FileMetadataKind::FilePath => "filepath",
            FileMetadataKind::FileName => "filename",
            FileMetadataKind::Suffix => "suffix",
        }
    }
}

/// Parse a partition column name of the form `dirN` (case-insensitive).
pub fn partition_depth_from_name(name: &str) -> Option<usize> {
    if name.len() <= 3 || !name[..3].eq_ignore_ascii_case("dir") {
        return None;
    }
    let digits = &name[3..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn partition_column_name(depth: usize) -> String {
    format!("dir{}", depth)
}

/// One entry of the parsed scan projection.
#[derive(Debug, Clone)]
pub enum ProjectedColumn {
    /// A column to be resolved against the reader's table schema.
    Table(SchemaPath),
    Wildcard,
    /// An implicit column resolved from file identity.
    FileMetadata {
        name: String,
        kind: FileMetadataKind,
    },
    /// A `dirN` column resolved from the path between the selection root and
    /// the file.
    Partition { name: String, depth: usize },
    /// The `columns` array, optionally restricted to a set of indexes.
    ColumnsArray { indices: Option<BTreeSet<usize>> },
}

impl Display for ProjectedColumn {
    /// Canonical projection-list form of the entry.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectedColumn::Table(path) => write!(f, "{}", path),
            ProjectedColumn::Wildcard => write!(f, "*"),
            ProjectedColumn::FileMetadata { name, .. } => write!(f, "{}", name),
            ProjectedColumn::Partition { name, .. } => write!(f, "{}", name),
            ProjectedColumn::ColumnsArray { indices: None } => write!(f, "{}", COLUMNS_ARRAY_NAME),
            ProjectedColumn::ColumnsArray {
                indices: Some(indices),
            } => {
                write!(f, "{}", COLUMNS_ARRAY_NAME)?;
                for index in indices {
                    write!(f, "[{}]", index)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_names_are_case_insensitive() {
        assert_eq!(
            FileMetadataKind::from_name("FileName"),
            Some(FileMetadataKind::FileName)
        );
        assert_eq!(FileMetadataKind::from_name("fqn"), Some(FileMetadataKind::Fqn));
        assert_eq!(FileMetadataKind::from_name("dir0"), None);
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(partition_depth_from_name("dir0"), Some(0));
        assert_eq!(partition_depth_from_name("DIR12"), Some(12));
        assert_eq!(partition_depth_from_name("dir"), None);
        assert_eq!(partition_depth_from_name("dirx"), None);
        assert_eq!(partition_depth_from_name("directory1"), None);
    }
}
