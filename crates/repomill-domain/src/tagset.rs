use std::fmt;

use glob::Pattern;
use indexmap::IndexSet;

/// Return true if `text` matches any of the glob patterns.
#[must_use]
pub fn match_globlist<S: AsRef<str>>(text: &str, globs: &[S]) -> bool {
    globs.iter().any(|g| {
        Pattern::new(g.as_ref())
            .map(|p| p.matches(text))
            .unwrap_or(false)
    })
}

/// An ordered set of unique tag names. Order is resolution order and is
/// preserved through persistence; the newline-delimited wire format is the
/// persisted TagSet file, the exclude file, and the create-only file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: IndexSet<String>,
}

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter<I, S>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses the newline-delimited format: one tag per line, blank lines
    /// ignored, duplicates collapsed keeping the first occurrence.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::from_iter(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        )
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Tags in reverse resolution order; the fleet iterates this way so
    /// tags sharing a lock key are spread across the run.
    pub fn iter_rev(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().rev().map(String::as_str)
    }

    /// Drops any tag matching one of the exclude globs.
    #[must_use]
    pub fn without_matching<S: AsRef<str>>(&self, globs: &[S]) -> Self {
        Self {
            tags: self
                .tags
                .iter()
                .filter(|tag| !match_globlist(tag.as_str(), globs))
                .cloned()
                .collect(),
        }
    }

    /// Tags present in `self` but not in `other` (exact names).
    #[must_use]
    pub fn difference(&self, other: &Self) -> Vec<&str> {
        self.iter().filter(|tag| !other.contains(tag)).collect()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tag in &self.tags {
            writeln!(f, "{tag}")?;
        }
        Ok(())
    }
}
