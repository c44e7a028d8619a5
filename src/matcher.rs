// src/matcher.rs
//! Pattern rules evaluated against a named field of a record.
//!
//! Rules are OR-ed: a record passes when any rule matches. Records that cannot
//! be tested (field missing or not a string) are let through, as is everything
//! when no rule is configured.

use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One configured rule: a pattern, its flags, and optionally the field it targets.
///
/// Flags use the familiar single-letter form: `i` (case-insensitive),
/// `m` (multi-line), `s` (dot matches newline), `x` (verbose), `u` (unicode,
/// always on) and `g` (global, meaningless for a yes/no test and ignored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl MatchRule {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: flags.into(),
            field: None,
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    field: String,
}

/// Outcome of a match test, kept for logging which rule let a record through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// No rules configured.
    Unfiltered,
    /// A rule's field was missing or not a string.
    Untestable { field: String },
    /// Rule at `rule` (config order) matched.
    Matched { rule: usize, pattern: String },
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchOutcome::NoMatch)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    rules: Vec<CompiledRule>,
}

impl Matcher {
    /// Compile `rules`; rules without their own field test `default_field`.
    pub fn compile(rules: &[MatchRule], default_field: &str) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (i, rule) in rules.iter().enumerate() {
            let regex = build_regex(&rule.pattern, &rule.flags)
                .with_context(|| format!("match rule #{i} (/{}/{})", rule.pattern, rule.flags))?;
            compiled.push(CompiledRule {
                regex,
                field: rule.field.clone().unwrap_or_else(|| default_field.to_string()),
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Test `record` against the rules, first decisive rule wins.
    pub fn evaluate(&self, record: &Record) -> MatchOutcome {
        if self.rules.is_empty() {
            return MatchOutcome::Unfiltered;
        }
        for (i, rule) in self.rules.iter().enumerate() {
            let Some(value) = record.get_str(&rule.field) else {
                return MatchOutcome::Untestable {
                    field: rule.field.clone(),
                };
            };
            if rule.regex.is_match(value) {
                return MatchOutcome::Matched {
                    rule: i,
                    pattern: rule.regex.as_str().to_string(),
                };
            }
        }
        MatchOutcome::NoMatch
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.evaluate(record).is_match()
    }
}

fn build_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut b = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                b.case_insensitive(true);
            }
            'm' => {
                b.multi_line(true);
            }
            's' => {
                b.dot_matches_new_line(true);
            }
            'x' => {
                b.ignore_whitespace(true);
            }
            'u' | 'g' => {}
            other => return Err(anyhow!("unknown regex flag '{other}'")),
        }
    }
    Ok(b.build()?)
}
