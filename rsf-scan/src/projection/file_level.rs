//! File-level projection: fix the implicit and partition columns to the
//! constant values they take for one file.

use rsf_core::schema::SchemaPath;
use rsf_core::util::case_map::CaseInsensitiveMap;

use crate::file_meta::FileMetadata;
use crate::options::ScanOptions;

use super::{partition_column_name, FileMetadataKind, ProjectedColumn, ScanLevelProjection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantOrigin {
    Metadata(FileMetadataKind),
    Partition(usize),
}

/// A projection entry with per-file constants resolved.
#[derive(Debug, Clone)]
pub enum FileColumn {
    Table(SchemaPath),
    Wildcard,
    Constant {
        name: String,
        value: Option<String>,
        origin: ConstantOrigin,
    },
    ColumnsArray,
}

#[derive(Debug, Clone)]
pub struct FileLevelProjection {
    pub columns: Vec<FileColumn>,
}

/// Apply one file's metadata to the scan-level projection.
///
/// Under legacy wildcard expansion the wildcard also emits the file's
/// partition columns, either at the wildcard position or appended at the
/// end, chosen by the legacy location flag.
pub fn resolve_file_projection(
    scan: &ScanLevelProjection,
    meta: &FileMetadata,
    options: &ScanOptions,
) -> FileLevelProjection {
    // implicit columns named explicitly must not be emitted twice by the
    // wildcard
    let mut explicit_implicit: CaseInsensitiveMap<()> = CaseInsensitiveMap::new();
    for column in &scan.columns {
        match column {
            ProjectedColumn::Partition { name, .. }
            | ProjectedColumn::FileMetadata { name, .. } => {
                explicit_implicit.insert(name.as_str(), ());
            }
            _ => {}
        }
    }

    let legacy_expansion = options.legacy_wildcard_expansion() && scan.has_wildcard;
    let expansion_depth = if legacy_expansion {
        meta.partition_depth()
            .max(options.partition_depth_hint().unwrap_or(0) as usize)
    } else {
        0
    };
    let expanded_implicit = |columns: &mut Vec<FileColumn>| {
        if !legacy_expansion {
            return;
        }
        for kind in [
            FileMetadataKind::Fqn,
            FileMetadataKind::FilePath,
            FileMetadataKind::FileName,
            FileMetadataKind::Suffix,
        ] {
            let name = kind.column_name();
            if explicit_implicit.contains_key(name) {
                continue;
            }
            columns.push(FileColumn::Constant {
                name: name.to_string(),
                value: meta.metadata_value(kind),
                origin: ConstantOrigin::Metadata(kind),
            });
        }
        for depth in 0..expansion_depth {
            let name = partition_column_name(depth);
            if explicit_implicit.contains_key(&name) {
                continue;
            }
            columns.push(FileColumn::Constant {
                value: meta.dir(depth).map(|s| s.to_string()),
                origin: ConstantOrigin::Partition(depth),
                name,
            });
        }
    };

    let mut columns = Vec::new();
    for column in &scan.columns {
        match column {
            ProjectedColumn::Table(path) => columns.push(FileColumn::Table(path.clone())),
            ProjectedColumn::Wildcard => {
                columns.push(FileColumn::Wildcard);
                if options.legacy_partition_column_location() {
                    expanded_implicit(&mut columns);
                }
            }
            ProjectedColumn::FileMetadata { name, kind } => columns.push(FileColumn::Constant {
                name: name.clone(),
                value: meta.metadata_value(*kind),
                origin: ConstantOrigin::Metadata(*kind),
            }),
            ProjectedColumn::Partition { name, depth } => columns.push(FileColumn::Constant {
                name: name.clone(),
                value: meta.dir(*depth).map(|s| s.to_string()),
                origin: ConstantOrigin::Partition(*depth),
            }),
            ProjectedColumn::ColumnsArray { .. } => columns.push(FileColumn::ColumnsArray),
        }
    }
    if !options.legacy_partition_column_location() {
        expanded_implicit(&mut columns);
    }
    FileLevelProjection { columns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::parse_scan_projection;
    use rsf_core::schema::SchemaPath;
    use std::path::PathBuf;

    fn meta() -> FileMetadata {
        FileMetadata::new(
            Some(PathBuf::from("/w/x/y/z.csv")),
            Some(PathBuf::from("/w")),
        )
        .unwrap()
    }

    fn project(list: &[&str], options: &ScanOptions) -> FileLevelProjection {
        let paths: Vec<SchemaPath> = list.iter().map(|s| SchemaPath::parse(s).unwrap()).collect();
        let scan = parse_scan_projection(&paths, options).unwrap();
        resolve_file_projection(&scan, &meta(), options)
    }

    fn names(projection: &FileLevelProjection) -> Vec<String> {
        projection
            .columns
            .iter()
            .map(|c| match c {
                FileColumn::Table(path) => path.to_string(),
                FileColumn::Wildcard => "*".to_string(),
                FileColumn::Constant { name, .. } => name.clone(),
                FileColumn::ColumnsArray => "columns".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_metadata_constants() {
        let options = ScanOptions::default();
        let projection = project(&["a", "fqn", "filename", "dir1"], &options);
        let values: Vec<Option<String>> = projection
            .columns
            .iter()
            .filter_map(|c| match c {
                FileColumn::Constant { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Some("/w/x/y/z.csv".to_string()),
                Some("z.csv".to_string()),
                Some("y".to_string())
            ]
        );
    }

    #[test]
    fn test_partition_beyond_depth_is_null() {
        let options = ScanOptions::default();
        let projection = project(&["dir5"], &options);
        match &projection.columns[0] {
            FileColumn::Constant { value, .. } => assert!(value.is_none()),
            other => panic!("expected constant, got {other:?}"),
        }
    }

    #[test]
    fn test_modern_wildcard_emits_no_partitions() {
        let options = ScanOptions::default();
        let projection = project(&["*"], &options);
        assert_eq!(names(&projection), vec!["*"]);
    }

    #[test]
    fn test_legacy_wildcard_appends_implicit_columns() {
        let options = ScanOptions::builder()
            .set_legacy_wildcard_expansion(true)
            .build();
        let projection = project(&["*", "filename"], &options);
        assert_eq!(
            names(&projection),
            vec!["*", "filename", "fqn", "filepath", "suffix", "dir0", "dir1"]
        );
    }

    #[test]
    fn test_legacy_location_puts_implicit_columns_at_wildcard() {
        let options = ScanOptions::builder()
            .set_legacy_wildcard_expansion(true)
            .set_legacy_partition_column_location(true)
            .build();
        let projection = project(&["filename", "*"], &options);
        assert_eq!(
            names(&projection),
            vec!["filename", "*", "fqn", "filepath", "suffix", "dir0", "dir1"]
        );
    }

    #[test]
    fn test_explicit_partition_not_duplicated_by_expansion() {
        let options = ScanOptions::builder()
            .set_legacy_wildcard_expansion(true)
            .build();
        let projection = project(&["dir0", "*"], &options);
        assert_eq!(
            names(&projection),
            vec!["dir0", "*", "fqn", "filepath", "filename", "suffix", "dir1"]
        );
    }

    #[test]
    fn test_depth_hint_extends_expansion() {
        let options = ScanOptions::builder()
            .set_legacy_wildcard_expansion(true)
            .set_partition_depth_hint(3)
            .build();
        let projection = project(&["*"], &options);
        assert_eq!(
            names(&projection),
            vec!["*", "fqn", "filepath", "filename", "suffix", "dir0", "dir1", "dir2"]
        );
        match projection.columns.last().unwrap() {
            FileColumn::Constant { value, .. } => assert!(value.is_none()),
            other => panic!("expected constant, got {other:?}"),
        }
    }
}
