use std::path::{Path, PathBuf};

use rsf_core::errors::Result;
use rsf_core::user_schema_err;

use crate::projection::FileMetadataKind;

/// Identity of the file behind a reader, from which the implicit columns are
/// derived. `dir_segments` holds the path components between the selection
/// root and the file, exclusive of the file name.
#[derive(Debug, Clone, Default)]
pub struct FileMetadata {
    file_path: Option<PathBuf>,
    selection_root: Option<PathBuf>,
    dir_segments: Vec<String>,
}

impl FileMetadata {
    /// A reader with no file identity; every implicit column is null.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(file_path: Option<PathBuf>, selection_root: Option<PathBuf>) -> Result<Self> {
        let dir_segments = match (&file_path, &selection_root) {
            (Some(file), Some(root)) => {
                let relative = match file.strip_prefix(root) {
                    Ok(relative) => relative,
                    Err(_) => {
                        return user_schema_err!(
                            "file `{}` is not under the selection root `{}`",
                            file.display(),
                            root.display()
                        )
                    }
                };
                let mut segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                // the terminal segment is the file name, not a partition
                segments.pop();
                segments
            }
            _ => Vec::new(),
        };
        Ok(Self {
            file_path,
            selection_root,
            dir_segments,
        })
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn selection_root(&self) -> Option<&Path> {
        self.selection_root.as_deref()
    }

    /// Full path of the file.
    pub fn fqn(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Path of the directory holding the file.
    pub fn parent_path(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Terminal segment of the file path.
    pub fn file_name(&self) -> Option<String> {
        self.file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Characters after the last `.` of the file name, empty when the name
    /// has no dot.
    pub fn suffix(&self) -> Option<String> {
        self.file_name()
            .map(|name| match name.rfind('.') {
                Some(dot) => name[dot + 1..].to_string(),
                None => String::new(),
            })
    }

    /// The depth-th path segment between the selection root and the file.
    pub fn dir(&self, depth: usize) -> Option<&str> {
        self.dir_segments.get(depth).map(|s| s.as_str())
    }

    pub fn partition_depth(&self) -> usize {
        self.dir_segments.len()
    }

    pub fn metadata_value(&self, kind: FileMetadataKind) -> Option<String> {
        match kind {
            FileMetadataKind::Fqn => self.fqn(),
            FileMetadataKind::FilePath => self.parent_path(),
            FileMetadataKind::FileName => self.file_name(),
            FileMetadataKind::Suffix => self.suffix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(file: &str, root: &str) -> FileMetadata {
        FileMetadata::new(Some(PathBuf::from(file)), Some(PathBuf::from(root))).unwrap()
    }

    #[test]
    fn test_implicit_values() {
        let m = meta("/w/x/y/z.csv", "/w");
        assert_eq!(m.fqn().unwrap(), "/w/x/y/z.csv");
        assert_eq!(m.parent_path().unwrap(), "/w/x/y");
        assert_eq!(m.file_name().unwrap(), "z.csv");
        assert_eq!(m.suffix().unwrap(), "csv");
    }

    #[test]
    fn test_dir_segments_between_root_and_file() {
        let m = meta("/w/x/y/z.csv", "/w");
        assert_eq!(m.partition_depth(), 2);
        assert_eq!(m.dir(0), Some("x"));
        assert_eq!(m.dir(1), Some("y"));
        assert_eq!(m.dir(2), None);
    }

    #[test]
    fn test_file_at_root_has_no_partitions() {
        let m = meta("/w/z.csv", "/w");
        assert_eq!(m.partition_depth(), 0);
    }

    #[test]
    fn test_suffix_empty_without_dot() {
        let m = meta("/w/data", "/w");
        assert_eq!(m.suffix().unwrap(), "");
    }

    #[test]
    fn test_file_outside_root_rejected() {
        assert!(
            FileMetadata::new(Some(PathBuf::from("/a/b.csv")), Some(PathBuf::from("/w"))).is_err()
        );
    }

    #[test]
    fn test_no_file_yields_nulls() {
        let m = FileMetadata::none();
        assert_eq!(m.fqn(), None);
        assert_eq!(m.metadata_value(FileMetadataKind::Suffix), None);
    }
}
