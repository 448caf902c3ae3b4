//! Exclusion list for recursive copies.

use crate::error::Result;
use regex::Regex;
use std::fmt;

/// A single exclusion rule.
#[derive(Debug, Clone)]
pub enum Exclude {
    /// Matches when the tested text contains the string
    Literal(String),
    /// Matches when the regex finds a match anywhere in the tested text
    Pattern(Regex),
}

impl Exclude {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn pattern(re: &str) -> Result<Self> {
        Ok(Self::Pattern(Regex::new(re)?))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Exclude::Literal(s) => text.contains(s.as_str()),
            Exclude::Pattern(re) => re.is_match(text),
        }
    }
}

impl fmt::Display for Exclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclude::Literal(s) => write!(f, "{s}"),
            Exclude::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<Regex> for Exclude {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

impl From<&str> for Exclude {
    fn from(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

/// Ordered set of exclusion rules; a text is excluded if any rule matches.
#[derive(Debug, Clone, Default)]
pub struct Excludes(Vec<Exclude>);

impl Excludes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from literal strings and regex sources.
    pub fn from_parts<L, P>(literals: L, patterns: P) -> Result<Self>
    where
        L: IntoIterator,
        L::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut excludes: Vec<Exclude> = literals
            .into_iter()
            .map(|s| Exclude::Literal(s.into()))
            .collect();
        for re in patterns {
            excludes.push(Exclude::pattern(re.as_ref())?);
        }
        Ok(Self(excludes))
    }

    pub fn push(&mut self, exclude: impl Into<Exclude>) {
        self.0.push(exclude.into());
    }

    /// First rule matching `text`, if any.
    pub fn find(&self, text: &str) -> Option<&Exclude> {
        self.0.iter().find(|e| e.matches(text))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Exclude> for Excludes {
    fn from_iter<I: IntoIterator<Item = Exclude>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
