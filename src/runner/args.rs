//! Task selection grammar
//!
//! A selection string such as `build.web|api,docs` reads as:
//! - `.` separates depth levels of the task tree
//! - `|` separates groups that run concurrently within a level
//! - `,` or a space separates names that run in sequence within a group

use std::fmt;

/// Names run in sequence
pub type Group = Vec<String>;

/// Groups run concurrently
pub type Level = Vec<Group>;

/// Parsed selection: depth -> concurrent group -> sequential name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    levels: Vec<Level>,
}

impl Selection {
    /// Parse a single selection string.
    ///
    /// Empty names from repeated separators are dropped. A level left with no
    /// names ends the selection, so deeper nodes run their defaults.
    pub fn parse(input: &str) -> Self {
        let mut levels = Vec::new();

        for level in input.split('.') {
            let groups: Level = level
                .split('|')
                .map(|group| {
                    group
                        .split([',', ' '])
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect::<Group>()
                })
                .filter(|group| !group.is_empty())
                .collect();

            if groups.is_empty() {
                break;
            }
            levels.push(groups);
        }

        Selection { levels }
    }

    /// Parse several independent selections, one per input string
    pub fn parse_many<S: AsRef<str>>(inputs: &[S]) -> Vec<Selection> {
        inputs.iter().map(|input| Self::parse(input.as_ref())).collect()
    }

    pub fn from_levels(levels: Vec<Level>) -> Self {
        Selection { levels }
    }

    /// Whether no selection remains, meaning nodes run their own children
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Groups of the current level
    pub fn groups(&self) -> &[Group] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// The selection one level deeper
    pub fn advance(&self) -> Selection {
        Selection {
            levels: self.levels.iter().skip(1).cloned().collect(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<String> = self
            .levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|group| group.join(","))
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect();
        write!(f, "{}", levels.join("."))
    }
}

impl From<&str> for Selection {
    fn from(input: &str) -> Self {
        Selection::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(groups: &[&[&str]]) -> Level {
        groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_parse_levels_groups_and_sequences() {
        let selection = Selection::parse("a.b|c,d");
        assert_eq!(selection.depth(), 2);
        assert_eq!(selection.levels()[0], names(&[&["a"]]));
        assert_eq!(selection.levels()[1], names(&[&["b"], &["c", "d"]]));
    }

    #[test]
    fn test_space_separates_sequence() {
        let selection = Selection::parse("lint test|build");
        assert_eq!(selection.groups(), names(&[&["lint", "test"], &["build"]]).as_slice());
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        for input in ["a.b|c,d", "x", "build|test.web,api", "a b|c"] {
            let parsed = Selection::parse(input);
            let reparsed = Selection::parse(&parsed.to_string());
            assert_eq!(parsed, reparsed, "input {:?}", input);
        }
        assert_eq!(Selection::parse("a b|c").to_string(), "a,b|c");
    }

    #[test]
    fn test_empty_input() {
        assert!(Selection::parse("").is_empty());
        assert!(Selection::parse("").groups().is_empty());
    }

    #[test]
    fn test_empty_names_are_dropped() {
        let selection = Selection::parse("a,,b||c");
        assert_eq!(selection.groups(), names(&[&["a", "b"], &["c"]]).as_slice());
    }

    #[test]
    fn test_empty_level_ends_selection() {
        let selection = Selection::parse("a..b");
        assert_eq!(selection.depth(), 1);
        assert_eq!(Selection::parse("a.").depth(), 1);
    }

    #[test]
    fn test_advance() {
        let selection = Selection::parse("a.b.c");
        let next = selection.advance();
        assert_eq!(next.to_string(), "b.c");
        assert!(next.advance().advance().is_empty());
        assert!(Selection::default().advance().is_empty());
    }

    #[test]
    fn test_parse_many() {
        let selections = Selection::parse_many(&["a.b", "c|d"]);
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[1].groups().len(), 2);
    }
}
