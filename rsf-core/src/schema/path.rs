use std::fmt::{Display, Formatter};

use crate::errors::Result;
use crate::user_projection_err;

/// The distinguished root name that projects every reader column.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Name(String),
    Index(usize),
}

/// One entry of a projection list: a root name followed by member names and
/// array indexes, e.g. `a.b[2].c` or `columns[0]`. The wildcard `*` is a
/// distinguished root with no segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPath {
    root: String,
    segments: Vec<PathSegment>,
}

impl SchemaPath {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            segments: Vec::new(),
        }
    }

    pub fn wildcard() -> Self {
        Self::from_name(WILDCARD)
    }

    /// Parse the textual form. Reported failures are user projection errors.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return user_projection_err!("projected column name is empty");
        }
        if text == WILDCARD {
            return Ok(Self::wildcard());
        }
        if text.contains('*') {
            return user_projection_err!(
                "wildcard must stand alone in a projection list, not in `{}`",
                text
            );
        }

        let mut root: Option<String> = None;
        let mut segments = Vec::new();
        for part in text.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            let key = key.trim();
            if key.is_empty() {
                return user_projection_err!("projected column `{}` has an empty key", text);
            }
            match &root {
                None => root = Some(key.to_string()),
                Some(_) => segments.push(PathSegment::Name(key.to_string())),
            }
            while !rest.is_empty() {
                let close = match rest.find(']') {
                    Some(i) => i,
                    None => {
                        return user_projection_err!(
                            "unterminated array index in projected column `{}`",
                            text
                        )
                    }
                };
                if !rest.starts_with('[') {
                    return user_projection_err!("malformed projected column `{}`", text);
                }
                let index: usize = match rest[1..close].trim().parse() {
                    Ok(i) => i,
                    Err(_) => {
                        return user_projection_err!(
                            "array index `{}` in projected column `{}` is not a number",
                            &rest[1..close],
                            text
                        )
                    }
                };
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }
        Ok(Self {
            // Split always yields at least one part.
            root: root.unwrap_or_default(),
            segments,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_wildcard(&self) -> bool {
        self.root == WILDCARD
    }

    /// True when the path is a bare name with no members or indexes.
    pub fn is_simple(&self) -> bool {
        self.segments.is_empty()
    }

    /// Leading array indexes of the root, e.g. `0` for `columns[0]`.
    pub fn root_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments
            .iter()
            .take_while(|s| matches!(s, PathSegment::Index(_)))
            .map(|s| match s {
                PathSegment::Index(i) => *i,
                PathSegment::Name(_) => unreachable!(),
            })
    }

    pub fn root_matches(&self, name: &str) -> bool {
        self.root.eq_ignore_ascii_case(name)
    }
}

impl Display for SchemaPath {
    /// Canonical form: re-parsing the output yields an equal path.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Name(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a")]
    #[case("a.b")]
    #[case("columns[0]")]
    #[case("a.b[2].c")]
    #[case("*")]
    fn test_canonical_round_trip(#[case] text: &str) {
        let path = SchemaPath::parse(text).unwrap();
        assert_eq!(path.to_string(), text);
        assert_eq!(SchemaPath::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn test_parse_segments() {
        let path = SchemaPath::parse("a.b[2].c").unwrap();
        assert_eq!(path.root(), "a");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Name("b".to_string()),
                PathSegment::Index(2),
                PathSegment::Name("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_root_indexes() {
        let path = SchemaPath::parse("columns[0][2]").unwrap();
        assert_eq!(path.root_indexes().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[rstest]
    #[case("")]
    #[case("a..b")]
    #[case("a[")]
    #[case("a[x]")]
    #[case("a.*")]
    fn test_parse_errors(#[case] text: &str) {
        assert!(SchemaPath::parse(text).is_err());
    }

    #[test]
    fn test_wildcard() {
        let path = SchemaPath::parse(" * ").unwrap();
        assert!(path.is_wildcard());
        assert!(path.is_simple());
    }
}
