//! Scan-level parsing of the query's projection list.
//!
//! Parsers are plug-ins: specialised parsers claim the implicit file columns
//! and the `columns` array form, the base behaviour claims table columns and
//! the wildcard. Conflicts between the claimed forms are user errors.

use std::collections::BTreeSet;

use itertools::Itertools;

use rsf_core::errors::Result;
use rsf_core::schema::SchemaPath;
use rsf_core::user_projection_err;
use rsf_core::util::case_map::CaseInsensitiveMap;

use crate::options::ScanOptions;

use super::{
    partition_depth_from_name, FileMetadataKind, ProjectedColumn, COLUMNS_ARRAY_NAME,
    MAX_COLUMNS_INDEX,
};

/// The parsed projection list, before any file or reader is known.
#[derive(Debug, Clone)]
pub struct ScanLevelProjection {
    pub columns: Vec<ProjectedColumn>,
    /// A wildcard was present: project every reader column.
    pub project_all: bool,
    pub has_wildcard: bool,
}

impl ScanLevelProjection {
    /// Names of the table columns the loader should materialise.
    pub fn table_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter_map(|c| match c {
                ProjectedColumn::Table(path) => Some(path.root()),
                ProjectedColumn::ColumnsArray { .. } => Some(COLUMNS_ARRAY_NAME),
                _ => None,
            })
            .collect()
    }

    pub fn columns_array(&self) -> Option<&ProjectedColumn> {
        self.columns
            .iter()
            .find(|c| matches!(c, ProjectedColumn::ColumnsArray { .. }))
    }

    /// Re-emit the projection in canonical textual form. Parsing the result
    /// yields an equivalent projection.
    pub fn canonical(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_string()).collect_vec()
    }
}

/// One pluggable column parser. Each entry of the project list is offered to
/// the parsers in turn; the first to claim it translates it.
trait ScanColumnParser {
    fn parse(&mut self, path: &SchemaPath, output: &mut Vec<ProjectedColumn>) -> Result<bool>;

    /// Cross-entry validation once the whole list is parsed.
    fn validate(&self, output: &[ProjectedColumn], options: &ScanOptions) -> Result<()> {
        let _ = (output, options);
        Ok(())
    }
}

/// Claims `fqn`, `filepath`, `filename`, `suffix` and `dirN`. Duplicate
/// mentions of the same implicit column are idempotent.
#[derive(Default)]
struct FileMetadataColumnParser {
    seen: CaseInsensitiveMap<()>,
}

impl ScanColumnParser for FileMetadataColumnParser {
    fn parse(&mut self, path: &SchemaPath, output: &mut Vec<ProjectedColumn>) -> Result<bool> {
        if !path.is_simple() {
            return Ok(false);
        }
        let name = path.root();
        if let Some(kind) = FileMetadataKind::from_name(name) {
            if self.seen.insert(name, ()).is_none() {
                output.push(ProjectedColumn::FileMetadata {
                    name: name.to_string(),
                    kind,
                });
            }
            return Ok(true);
        }
        if let Some(depth) = partition_depth_from_name(name) {
            if self.seen.insert(name, ()).is_none() {
                output.push(ProjectedColumn::Partition {
                    name: name.to_string(),
                    depth,
                });
            }
            return Ok(true);
        }
        Ok(false)
    }
}

/// Claims `columns` and `columns[n]` for readers that opt into the array
/// form.
struct ColumnsArrayParser {
    enabled: bool,
    saw_plain: bool,
    saw_indexed: bool,
    indices: BTreeSet<usize>,
    position: Option<usize>,
}

impl ColumnsArrayParser {
    fn new(options: &ScanOptions) -> Self {
        Self {
            enabled: options.enable_columns_array(),
            saw_plain: false,
            saw_indexed: false,
            indices: BTreeSet::new(),
            position: None,
        }
    }
}

impl ScanColumnParser for ColumnsArrayParser {
    fn parse(&mut self, path: &SchemaPath, output: &mut Vec<ProjectedColumn>) -> Result<bool> {
        if !self.enabled || !path.root_matches(COLUMNS_ARRAY_NAME) {
            return Ok(false);
        }
        let indexes: Vec<usize> = path.root_indexes().collect();
        if indexes.len() != path.segments().len() {
            return user_projection_err!(
                "the `{}` array has no named members: `{}`",
                COLUMNS_ARRAY_NAME,
                path
            );
        }
        if indexes.is_empty() {
            self.saw_plain = true;
        } else {
            self.saw_indexed = true;
            for index in indexes {
                if index >= MAX_COLUMNS_INDEX {
                    return user_projection_err!(
                        "`{}` index {} exceeds the maximum of {}",
                        COLUMNS_ARRAY_NAME,
                        index,
                        MAX_COLUMNS_INDEX - 1
                    );
                }
                self.indices.insert(index);
            }
        }
        match self.position {
            Some(at) => {
                // merge into the entry claimed earlier
                output[at] = self.entry();
            }
            None => {
                self.position = Some(output.len());
                output.push(self.entry());
            }
        }
        Ok(true)
    }

    fn validate(&self, output: &[ProjectedColumn], options: &ScanOptions) -> Result<()> {
        if self.position.is_none() {
            return Ok(());
        }
        if self.saw_plain && self.saw_indexed {
            return user_projection_err!(
                "`{}` may not be projected together with `{}[n]`",
                COLUMNS_ARRAY_NAME,
                COLUMNS_ARRAY_NAME
            );
        }
        for column in output {
            match column {
                ProjectedColumn::Table(path) => {
                    return user_projection_err!(
                        "`{}` may not be projected together with column `{}`",
                        COLUMNS_ARRAY_NAME,
                        path
                    )
                }
                ProjectedColumn::Wildcard if !options.wildcard_expands_columns() => {
                    return user_projection_err!(
                        "`{}` may not be projected together with the wildcard",
                        COLUMNS_ARRAY_NAME
                    )
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl ColumnsArrayParser {
    fn entry(&self) -> ProjectedColumn {
        ProjectedColumn::ColumnsArray {
            indices: if self.saw_indexed {
                Some(self.indices.clone())
            } else {
                None
            },
        }
    }
}

/// Parse the ordered projection list into scan-level columns.
pub fn parse_scan_projection(
    projection_list: &[SchemaPath],
    options: &ScanOptions,
) -> Result<ScanLevelProjection> {
    let mut metadata_parser = FileMetadataColumnParser::default();
    let mut columns_parser = ColumnsArrayParser::new(options);

    let mut columns = Vec::new();
    let mut has_wildcard = false;
    for path in projection_list {
        if path.is_wildcard() {
            if has_wildcard {
                return user_projection_err!("duplicate wildcard in the projection list");
            }
            has_wildcard = true;
            columns.push(ProjectedColumn::Wildcard);
            continue;
        }
        if metadata_parser.parse(path, &mut columns)? {
            continue;
        }
        if columns_parser.parse(path, &mut columns)? {
            continue;
        }
        columns.push(ProjectedColumn::Table(path.clone()));
    }

    metadata_parser.validate(&columns, options)?;
    columns_parser.validate(&columns, options)?;

    Ok(ScanLevelProjection {
        columns,
        project_all: has_wildcard,
        has_wildcard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<SchemaPath> {
        list.iter().map(|s| SchemaPath::parse(s).unwrap()).collect()
    }

    fn parse(list: &[&str], options: &ScanOptions) -> Result<ScanLevelProjection> {
        parse_scan_projection(&paths(list), options)
    }

    #[test]
    fn test_table_and_metadata_columns() {
        let options = ScanOptions::default();
        let projection = parse(&["a", "fqn", "b", "dir0"], &options).unwrap();
        assert!(!projection.project_all);
        assert_eq!(projection.columns.len(), 4);
        assert!(matches!(
            projection.columns[1],
            ProjectedColumn::FileMetadata {
                kind: FileMetadataKind::Fqn,
                ..
            }
        ));
        assert!(matches!(
            projection.columns[3],
            ProjectedColumn::Partition { depth: 0, .. }
        ));
        assert_eq!(projection.table_column_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_implicit_columns_are_idempotent() {
        let options = ScanOptions::default();
        let projection = parse(&["fqn", "FQN", "a"], &options).unwrap();
        assert_eq!(projection.columns.len(), 2);
    }

    #[test]
    fn test_wildcard() {
        let options = ScanOptions::default();
        let projection = parse(&["*"], &options).unwrap();
        assert!(projection.project_all);
        assert!(projection.has_wildcard);
        assert!(parse(&["*", "*"], &options).is_err());
    }

    #[test]
    fn test_columns_array_disabled_is_a_table_column() {
        let options = ScanOptions::default();
        let projection = parse(&["columns"], &options).unwrap();
        assert!(matches!(projection.columns[0], ProjectedColumn::Table(_)));
    }

    #[test]
    fn test_columns_array_indexes_merge() {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        let projection = parse(&["columns[0]", "columns[2]"], &options).unwrap();
        assert_eq!(projection.columns.len(), 1);
        match &projection.columns[0] {
            ProjectedColumn::ColumnsArray {
                indices: Some(indices),
            } => {
                assert_eq!(indices.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
            }
            other => panic!("expected columns array, got {other:?}"),
        }
    }

    #[rstest::rstest]
    #[case("columns", "columns[1]")]
    #[case("columns", "a")]
    #[case("columns", "*")]
    fn test_columns_array_conflicts(#[case] first: &str, #[case] second: &str) {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        assert!(parse(&[first, second], &options).is_err());
    }

    #[test]
    fn test_columns_array_with_metadata_columns() {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        assert!(parse(&["columns", "filename"], &options).is_ok());
    }

    #[test]
    fn test_columns_array_with_expanding_wildcard() {
        let options = ScanOptions::builder()
            .set_enable_columns_array(true)
            .set_wildcard_expands_columns(true)
            .build();
        assert!(parse(&["columns", "*"], &options).is_ok());
    }

    #[test]
    fn test_columns_index_bound() {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        assert!(parse(&["columns[65536]"], &options).is_err());
    }

    #[test]
    fn test_canonical_round_trip() {
        let options = ScanOptions::builder().set_enable_columns_array(true).build();
        for list in [
            vec!["a", "b.c", "fqn", "dir1"],
            vec!["*"],
            vec!["columns[0]", "columns[2]"],
        ] {
            let parsed = parse(&list, &options).unwrap();
            let canonical = parsed.canonical();
            let reparsed = parse(
                &canonical.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                &options,
            )
            .unwrap();
            assert_eq!(parsed.canonical(), reparsed.canonical());
        }
    }
}
