// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composable filters over subscriptions, episodes and plain names.
//!
//! Every filterable type is first reduced to a [`Candidate`] through
//! [`AsCandidate`]; filters only ever look at candidates. Fields a type does
//! not have are `None`: a missing `enabled` flag passes [`Filter::Enabled`],
//! a missing pubdate fails both pubdate filters.

use chrono::NaiveDate;
use regex::Regex;

use crate::model::{Episode, Pubdate, Subscription};

/// The normalized view a filter evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub enabled: Option<bool>,
    pub pubdate: Option<Pubdate>,
}

/// Extracts a [`Candidate`] from a richer value
pub trait AsCandidate {
    fn as_candidate(&self) -> Candidate<'_>;
}

impl AsCandidate for str {
    fn as_candidate(&self) -> Candidate<'_> {
        Candidate {
            name: self,
            enabled: None,
            pubdate: None,
        }
    }
}

impl AsCandidate for String {
    fn as_candidate(&self) -> Candidate<'_> {
        self.as_str().as_candidate()
    }
}

impl AsCandidate for Subscription {
    fn as_candidate(&self) -> Candidate<'_> {
        Candidate {
            name: &self.name,
            enabled: Some(self.enabled),
            pubdate: None,
        }
    }
}

impl AsCandidate for Episode {
    fn as_candidate(&self) -> Candidate<'_> {
        Candidate {
            name: &self.id,
            enabled: None,
            pubdate: Some(self.pubdate),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Filter {
    /// Accepts everything
    All,
    /// Exact name match
    Name(String),
    /// Shell wildcard match (`*`, `?`, `[...]`) against any of the patterns
    Wildcard(Vec<Regex>),
    /// Candidates whose enabled flag equals the value
    Enabled(bool),
    /// Publication date on or after the given day
    PubdateAfter(NaiveDate),
    /// Publication date on or before the given day
    PubdateBefore(NaiveDate),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl Filter {
    pub fn name(name: impl Into<String>) -> Self {
        Filter::Name(name.into())
    }

    /// Match any of `patterns`; an empty list matches everything
    pub fn wildcard<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        if patterns.is_empty() {
            return Ok(Filter::All);
        }
        let compiled = patterns
            .iter()
            .map(|p| Regex::new(&glob_to_regex(p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Filter::Wildcard(compiled))
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut filters) => {
                filters.push(other);
                Filter::Or(filters)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn and_not(self, other: Filter) -> Self {
        self.and(other.negate())
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    pub fn matches<C: AsCandidate + ?Sized>(&self, value: &C) -> bool {
        self.accepts(&value.as_candidate())
    }

    pub fn accepts(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            Filter::All => true,
            Filter::Name(name) => candidate.name == name,
            Filter::Wildcard(patterns) => patterns.iter().any(|re| re.is_match(candidate.name)),
            Filter::Enabled(wanted) => candidate.enabled.is_none_or(|e| e == *wanted),
            Filter::PubdateAfter(since) => pubdate_day(candidate).is_some_and(|d| d >= *since),
            Filter::PubdateBefore(until) => pubdate_day(candidate).is_some_and(|d| d <= *until),
            Filter::Not(inner) => !inner.accepts(candidate),
            Filter::And(filters) => filters.iter().all(|f| f.accepts(candidate)),
            Filter::Or(filters) => filters.iter().any(|f| f.accepts(candidate)),
        }
    }
}

fn pubdate_day(candidate: &Candidate<'_>) -> Option<NaiveDate> {
    candidate.pubdate.as_ref().and_then(Pubdate::date)
}

/// Translate a shell wildcard into an anchored regular expression
fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let class: String = chars.clone().take_while(|&c| c != ']').collect();
                let closed = chars.clone().nth(class.chars().count()) == Some(']');
                if !closed || class.is_empty() || class == "!" {
                    re.push_str(r"\[");
                    continue;
                }
                for _ in 0..=class.chars().count() {
                    chars.next();
                }
                let (negated, body) = match class.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, class.as_str()),
                };
                re.push('[');
                if negated {
                    re.push('^');
                }
                for c in body.chars() {
                    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }

    re.push('$');
    re
}
