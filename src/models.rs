use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::category::NpsCategory;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub unreadable_rows: usize,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Short rows (ragged CSV exports) read as blank cells.
    pub fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Normalized column identity. The `Display` form doubles as the header name
/// used when a canonical dataset is written back out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CanonicalField {
    Timestamp,
    Email,
    Recommendation,
    Resubscription,
    FirstName,
    LastName,
    Comment(String),
    Satisfaction(String),
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalField::Timestamp => write!(f, "timestamp"),
            CanonicalField::Email => write!(f, "email"),
            CanonicalField::Recommendation => write!(f, "recommendation"),
            CanonicalField::Resubscription => write!(f, "resubscription"),
            CanonicalField::FirstName => write!(f, "first_name"),
            CanonicalField::LastName => write!(f, "last_name"),
            CanonicalField::Comment(slot) => write!(f, "comment:{slot}"),
            CanonicalField::Satisfaction(key) => write!(f, "satisfaction:{key}"),
        }
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let field = match value {
            "timestamp" => CanonicalField::Timestamp,
            "email" => CanonicalField::Email,
            "recommendation" => CanonicalField::Recommendation,
            "resubscription" => CanonicalField::Resubscription,
            "first_name" => CanonicalField::FirstName,
            "last_name" => CanonicalField::LastName,
            other => match other.split_once(':') {
                Some(("comment", slot)) if !slot.is_empty() => {
                    CanonicalField::Comment(slot.to_string())
                }
                Some(("satisfaction", key)) if !key.is_empty() => {
                    CanonicalField::Satisfaction(key.to_string())
                }
                _ => return Err(format!("unknown canonical field `{other}`")),
            },
        };
        Ok(field)
    }
}

impl TryFrom<String> for CanonicalField {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CanonicalField> for String {
    fn from(field: CanonicalField) -> Self {
        field.to_string()
    }
}

/// One cleaned survey response. The category is never stored; it is
/// always derived from `recommendation_score`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResponse {
    pub timestamp: NaiveDateTime,
    pub recommendation_score: u8,
    pub resubscription_score: Option<u8>,
    pub satisfaction_scores: BTreeMap<String, u8>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub comments: BTreeMap<String, String>,
    pub extra_fields: BTreeMap<String, String>,
}

impl CanonicalResponse {
    pub fn new(timestamp: NaiveDateTime, recommendation_score: u8) -> Self {
        Self {
            timestamp,
            recommendation_score,
            resubscription_score: None,
            satisfaction_scores: BTreeMap::new(),
            first_name: None,
            last_name: None,
            email: None,
            comments: BTreeMap::new(),
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> NpsCategory {
        NpsCategory::from_score(Some(i64::from(self.recommendation_score)))
    }

    pub fn month(&self) -> YearMonth {
        YearMonth::of(&self.timestamp)
    }

    pub fn satisfaction(&self, criterion: &str) -> Option<u8> {
        self.satisfaction_scores.get(criterion).copied()
    }

    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self::new(timestamp.year(), timestamp.month())
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn contains(self, timestamp: &NaiveDateTime) -> bool {
        Self::of(timestamp) == self
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<YearMonth> for String {
    fn from(month: YearMonth) -> Self {
        month.to_string()
    }
}
