//! Predecessor reference strings.
//!
//! Wire format: `<digits>(.<digits>)*` followed by an optional two-letter
//! relation code and an optional signed lag in days, with no separators:
//! `4.21`, `4.21FS+2`, `10SS-1`, `7+3`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::hierarchy;

/// Dependency relation between a predecessor and its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "FS")]
    FinishToStart,
    #[serde(rename = "SS")]
    StartToStart,
    #[serde(rename = "FF")]
    FinishToFinish,
}

impl Relation {
    pub fn code(self) -> &'static str {
        match self {
            Relation::FinishToStart => "FS",
            Relation::StartToStart => "SS",
            Relation::FinishToFinish => "FF",
        }
    }

    pub fn from_code(code: &str) -> Option<Relation> {
        match code {
            "FS" => Some(Relation::FinishToStart),
            "SS" => Some(Relation::StartToStart),
            "FF" => Some(Relation::FinishToFinish),
            _ => None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A parsed predecessor reference.
///
/// `relation` and `lag_days` record only what was written, so that
/// serializing gives back the exact input. Use [`Reference::effective_relation`]
/// and [`Reference::effective_lag`] for scheduling semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Hierarchy number of the predecessor task
    pub target: String,
    pub relation: Option<Relation>,
    pub lag_days: Option<i32>,
}

impl Reference {
    pub fn new(target: impl Into<String>) -> Self {
        Reference {
            target: target.into(),
            relation: None,
            lag_days: None,
        }
    }

    pub fn effective_relation(&self) -> Relation {
        self.relation.unwrap_or(Relation::FinishToStart)
    }

    pub fn effective_lag(&self) -> i32 {
        self.lag_days.unwrap_or(0)
    }

    /// Same relation and lag, different target.
    pub fn retarget(&self, target: impl Into<String>) -> Reference {
        Reference {
            target: target.into(),
            relation: self.relation,
            lag_days: self.lag_days,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)?;
        if let Some(rel) = self.relation {
            f.write_str(rel.code())?;
        }
        if let Some(lag) = self.lag_days {
            write!(f, "{:+}", lag)?;
        }
        Ok(())
    }
}

/// Why a reference string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("empty predecessor reference")]
    Empty,
    #[error("predecessor reference '{0}' has no target number")]
    EmptyTarget(String),
    #[error("invalid target number '{0}'")]
    InvalidTarget(String),
    #[error("unknown relation code '{0}' (expected FS, SS or FF)")]
    UnknownRelation(String),
    #[error("invalid lag '{0}' (expected a signed day count like +2 or -1)")]
    InvalidLag(String),
}

/// Parse a single predecessor reference.
pub fn parse_reference(s: &str) -> Result<Reference, ReferenceError> {
    if s.is_empty() {
        return Err(ReferenceError::Empty);
    }

    // The suffix starts at the first char that is neither a digit nor a dot
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (target, suffix) = s.split_at(split);

    if target.is_empty() {
        return Err(ReferenceError::EmptyTarget(s.to_string()));
    }
    if !hierarchy::is_target_syntax(target) {
        return Err(ReferenceError::InvalidTarget(target.to_string()));
    }

    let code_len = suffix
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(suffix.len());
    let (code, rest) = suffix.split_at(code_len);

    let relation = if code.is_empty() {
        None
    } else {
        Some(
            Relation::from_code(code)
                .ok_or_else(|| ReferenceError::UnknownRelation(code.to_string()))?,
        )
    };

    let lag_days = if rest.is_empty() {
        None
    } else {
        Some(parse_lag(rest)?)
    };

    Ok(Reference {
        target: target.to_string(),
        relation,
        lag_days,
    })
}

/// `+2` / `-1` / `+0`. Rejects unsigned, leading zeros and `-0`, none of
/// which would serialize back to the same text.
fn parse_lag(s: &str) -> Result<i32, ReferenceError> {
    let invalid = || ReferenceError::InvalidLag(s.to_string());
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'+') => (false, &s[1..]),
        Some(b'-') => (true, &s[1..]),
        _ => return Err(invalid()),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(invalid());
    }
    if negative && digits == "0" {
        return Err(invalid());
    }
    let magnitude: i64 = digits.parse().map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).map_err(|_| invalid())
}

/// Parse user input like `"1, 2FS+3 4"` into references. Stops at the
/// first malformed entry.
pub fn parse_reference_list(input: &str) -> Result<Vec<Reference>, ReferenceError> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(parse_reference)
        .collect()
}
