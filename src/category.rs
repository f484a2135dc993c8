use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpsCategory {
    Promoter,
    Passive,
    Detractor,
    Unknown,
}

pub const SCORE_RANGE: RangeInclusive<i64> = 0..=10;
pub const PROMOTER_MIN: i64 = 9;
pub const PASSIVE_MIN: i64 = 7;

impl NpsCategory {
    pub const RATED: [NpsCategory; 3] = [
        NpsCategory::Promoter,
        NpsCategory::Passive,
        NpsCategory::Detractor,
    ];

    pub fn from_score(score: Option<i64>) -> Self {
        match score {
            Some(s) if !SCORE_RANGE.contains(&s) => NpsCategory::Unknown,
            Some(s) if s >= PROMOTER_MIN => NpsCategory::Promoter,
            Some(s) if s >= PASSIVE_MIN => NpsCategory::Passive,
            Some(_) => NpsCategory::Detractor,
            None => NpsCategory::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NpsCategory::Promoter => "Promoter",
            NpsCategory::Passive => "Passive",
            NpsCategory::Detractor => "Detractor",
            NpsCategory::Unknown => "Unknown",
        }
    }
}

/// Anything that is not an integral score in 0..=10 reads as `Unknown`.
pub fn categorize_raw(value: &str) -> NpsCategory {
    NpsCategory::from_score(parse_integral(value))
}

/// Accepts "9", " 9 " and "9.0"; rejects "9.5", "abc" and blanks.
pub fn parse_integral(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for NpsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NpsCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "promoter" | "promoters" => Ok(NpsCategory::Promoter),
            "passive" | "passives" => Ok(NpsCategory::Passive),
            "detractor" | "detractors" => Ok(NpsCategory::Detractor),
            "unknown" => Ok(NpsCategory::Unknown),
            other => Err(format!(
                "unknown category `{other}` (expected promoter, passive, detractor or unknown)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_valid_score_is_rated() {
        for s in 0..=10 {
            let category = NpsCategory::from_score(Some(s));
            assert!(NpsCategory::RATED.contains(&category), "score {s}");
            assert_eq!(category, NpsCategory::from_score(Some(s)));
        }
    }

    #[test]
    fn boundaries_follow_standard_bands() {
        assert_eq!(NpsCategory::from_score(Some(10)), NpsCategory::Promoter);
        assert_eq!(NpsCategory::from_score(Some(9)), NpsCategory::Promoter);
        assert_eq!(NpsCategory::from_score(Some(8)), NpsCategory::Passive);
        assert_eq!(NpsCategory::from_score(Some(7)), NpsCategory::Passive);
        assert_eq!(NpsCategory::from_score(Some(6)), NpsCategory::Detractor);
        assert_eq!(NpsCategory::from_score(Some(0)), NpsCategory::Detractor);
    }

    #[test]
    fn raw_values_never_fail() {
        assert_eq!(categorize_raw("9"), NpsCategory::Promoter);
        assert_eq!(categorize_raw(" 7.0 "), NpsCategory::Passive);
        assert_eq!(categorize_raw("abc"), NpsCategory::Unknown);
        assert_eq!(categorize_raw(""), NpsCategory::Unknown);
        assert_eq!(categorize_raw("8.5"), NpsCategory::Unknown);
        assert_eq!(categorize_raw("11"), NpsCategory::Unknown);
        assert_eq!(categorize_raw("-1"), NpsCategory::Unknown);
        assert_eq!(categorize_raw("42"), NpsCategory::Unknown);
        assert_eq!(categorize_raw("10.0"), NpsCategory::Promoter);
    }

    #[test]
    fn parses_cli_names() {
        assert_eq!("Promoters".parse::<NpsCategory>(), Ok(NpsCategory::Promoter));
        assert_eq!("passive".parse::<NpsCategory>(), Ok(NpsCategory::Passive));
        assert!("neutral".parse::<NpsCategory>().is_err());
    }
}
