use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::category::NpsCategory;
use crate::models::CanonicalResponse;

pub const RECENT_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodPreset {
    LastResponses(usize),
    Last30Days,
    Last3Months,
    LastYear,
    ThisYear,
    All,
}

impl PeriodPreset {
    fn lookback_days(self) -> Option<i64> {
        match self {
            PeriodPreset::Last30Days => Some(30),
            PeriodPreset::Last3Months => Some(90),
            PeriodPreset::LastYear => Some(365),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodPreset::LastResponses(n) => write!(f, "last-{n}"),
            PeriodPreset::Last30Days => write!(f, "last-30-days"),
            PeriodPreset::Last3Months => write!(f, "last-3-months"),
            PeriodPreset::LastYear => write!(f, "last-year"),
            PeriodPreset::ThisYear => write!(f, "this-year"),
            PeriodPreset::All => write!(f, "all"),
        }
    }
}

impl FromStr for PeriodPreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "last-30-days" | "month" => Ok(PeriodPreset::Last30Days),
            "last-3-months" | "quarter" => Ok(PeriodPreset::Last3Months),
            "last-year" => Ok(PeriodPreset::LastYear),
            "this-year" => Ok(PeriodPreset::ThisYear),
            "all" => Ok(PeriodPreset::All),
            other => other
                .strip_prefix("last-")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(PeriodPreset::LastResponses)
                .ok_or_else(|| {
                    format!(
                        "unknown period `{other}` (expected last-<n>, last-30-days, \
                         last-3-months, last-year, this-year or all)"
                    )
                }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Preset(PeriodPreset),
    Range { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFilter {
    pub window: Window,
    /// `None` keeps every category; an empty set keeps nothing.
    pub categories: Option<BTreeSet<NpsCategory>>,
    pub name_query: Option<String>,
    /// Reference point for relative presets. Defaults to the latest
    /// response in the dataset.
    pub as_of: Option<NaiveDateTime>,
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self {
            window: Window::Preset(PeriodPreset::All),
            categories: None,
            name_query: None,
            as_of: None,
        }
    }
}

impl ResponseFilter {
    pub fn preset(preset: PeriodPreset) -> Self {
        Self {
            window: Window::Preset(preset),
            ..Self::default()
        }
    }
}

pub fn latest_timestamp(dataset: &[CanonicalResponse]) -> Option<NaiveDateTime> {
    dataset.iter().map(|r| r.timestamp).max()
}

pub fn filter_responses(
    dataset: &[CanonicalResponse],
    filter: &ResponseFilter,
) -> Vec<CanonicalResponse> {
    let Some(anchor) = filter.as_of.or_else(|| latest_timestamp(dataset)) else {
        return Vec::new();
    };

    let mut ordered: Vec<&CanonicalResponse> = dataset.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let windowed: Vec<&CanonicalResponse> = match filter.window {
        Window::Preset(PeriodPreset::LastResponses(n)) => ordered.into_iter().take(n).collect(),
        Window::Preset(preset) => ordered
            .into_iter()
            .filter(|r| in_preset(r.timestamp, preset, anchor))
            .collect(),
        Window::Range { start, end } => ordered
            .into_iter()
            .filter(|r| (start..=end).contains(&r.timestamp.date()))
            .collect(),
    };

    let name_query = filter
        .name_query
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    windowed
        .into_iter()
        .filter(|r| match &name_query {
            Some(query) => matches_name(r, query),
            None => true,
        })
        .filter(|r| match &filter.categories {
            Some(selected) => selected.contains(&r.category()),
            None => true,
        })
        .cloned()
        .collect()
}

fn in_preset(timestamp: NaiveDateTime, preset: PeriodPreset, anchor: NaiveDateTime) -> bool {
    if timestamp > anchor {
        return preset == PeriodPreset::All;
    }
    match preset {
        PeriodPreset::All | PeriodPreset::LastResponses(_) => true,
        PeriodPreset::ThisYear => timestamp.year() == anchor.year(),
        other => other
            .lookback_days()
            .map(|days| timestamp >= anchor - Duration::days(days))
            .unwrap_or(true),
    }
}

/// `query` must already be lowercased.
fn matches_name(response: &CanonicalResponse, query: &str) -> bool {
    response
        .full_name()
        .map(|name| name.to_lowercase().contains(query))
        .unwrap_or(false)
}

pub fn is_recent(response: &CanonicalResponse, anchor: NaiveDateTime) -> bool {
    let age = anchor - response.timestamp;
    age >= Duration::zero() && age < Duration::days(RECENT_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(date: (i32, u32, u32), score: u8, name: Option<(&str, &str)>) -> CanonicalResponse {
        let timestamp = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut response = CanonicalResponse::new(timestamp, score);
        if let Some((first, last)) = name {
            response.first_name = Some(first.to_string());
            response.last_name = Some(last.to_string());
        }
        response
    }

    fn dataset() -> Vec<CanonicalResponse> {
        vec![
            sample_response((2023, 11, 20), 3, Some(("Jean", "Martin"))),
            sample_response((2024, 1, 10), 9, Some(("Marie", "Dubois"))),
            sample_response((2024, 2, 25), 7, None),
            sample_response((2024, 3, 10), 10, Some(("Sophie", "Martin"))),
            sample_response((2024, 3, 14), 5, Some(("Pierre", "Bernard"))),
        ]
    }

    fn days(responses: &[CanonicalResponse]) -> Vec<String> {
        responses
            .iter()
            .map(|r| r.timestamp.date().to_string())
            .collect()
    }

    #[test]
    fn presets_are_anchored_on_latest_response() {
        let data = dataset();
        let last_30 = filter_responses(&data, &ResponseFilter::preset(PeriodPreset::Last30Days));
        assert_eq!(days(&last_30), vec!["2024-03-14", "2024-03-10", "2024-02-25"]);

        let this_year = filter_responses(&data, &ResponseFilter::preset(PeriodPreset::ThisYear));
        assert_eq!(this_year.len(), 4);

        let all = filter_responses(&data, &ResponseFilter::default());
        assert_eq!(all.len(), 5);
        assert_eq!(days(&all)[0], "2024-03-14");
    }

    #[test]
    fn last_responses_ignores_dates() {
        let data = dataset();
        let last_two = filter_responses(&data, &ResponseFilter::preset(PeriodPreset::LastResponses(2)));
        assert_eq!(days(&last_two), vec!["2024-03-14", "2024-03-10"]);
        let many = filter_responses(&data, &ResponseFilter::preset(PeriodPreset::LastResponses(10)));
        assert_eq!(many.len(), 5);
    }

    #[test]
    fn explicit_anchor_bounds_relative_presets() {
        let data = dataset();
        let filter = ResponseFilter {
            as_of: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0),
            ..ResponseFilter::preset(PeriodPreset::Last3Months)
        };
        assert_eq!(days(&filter_responses(&data, &filter)), vec!["2024-01-10", "2023-11-20"]);
    }

    #[test]
    fn date_range_is_inclusive() {
        let data = dataset();
        let filter = ResponseFilter {
            window: Window::Range {
                start: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            },
            ..ResponseFilter::default()
        };
        assert_eq!(
            days(&filter_responses(&data, &filter)),
            vec!["2024-03-10", "2024-02-25", "2024-01-10"]
        );
    }

    #[test]
    fn name_search_is_case_insensitive_and_skips_anonymous() {
        let data = dataset();
        let filter = ResponseFilter {
            name_query: Some("  MARTIN ".to_string()),
            ..ResponseFilter::default()
        };
        let found = filter_responses(&data, &filter);
        assert_eq!(found.len(), 2);
        let by_first = ResponseFilter {
            name_query: Some("sophie mar".to_string()),
            ..ResponseFilter::default()
        };
        assert_eq!(filter_responses(&data, &by_first).len(), 1);
    }

    #[test]
    fn empty_category_selection_excludes_everything() {
        let data = dataset();
        let none = ResponseFilter {
            categories: Some(BTreeSet::new()),
            ..ResponseFilter::default()
        };
        assert!(filter_responses(&data, &none).is_empty());

        let detractors = ResponseFilter {
            categories: Some(BTreeSet::from([NpsCategory::Detractor])),
            ..ResponseFilter::default()
        };
        assert_eq!(days(&filter_responses(&data, &detractors)), vec!["2024-03-14", "2023-11-20"]);
    }

    #[test]
    fn filters_compose_and_repeat_identically() {
        let data = dataset();
        let filter = ResponseFilter {
            window: Window::Preset(PeriodPreset::ThisYear),
            categories: Some(BTreeSet::from([NpsCategory::Promoter, NpsCategory::Detractor])),
            name_query: Some("martin".to_string()),
            as_of: None,
        };
        let first = filter_responses(&data, &filter);
        assert_eq!(days(&first), vec!["2024-03-10"]);
        assert_eq!(filter_responses(&data, &filter), first);
        assert!(filter_responses(&[], &filter).is_empty());
    }

    #[test]
    fn presets_parse_from_cli_names() {
        assert_eq!("last-10".parse::<PeriodPreset>(), Ok(PeriodPreset::LastResponses(10)));
        assert_eq!("last-30-days".parse::<PeriodPreset>(), Ok(PeriodPreset::Last30Days));
        assert_eq!("This-Year".parse::<PeriodPreset>(), Ok(PeriodPreset::ThisYear));
        assert!("last-0".parse::<PeriodPreset>().is_err());
        assert!("yesterday".parse::<PeriodPreset>().is_err());
        assert_eq!(PeriodPreset::LastResponses(5).to_string(), "last-5");
    }

    #[test]
    fn recent_marker_covers_four_days() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert!(is_recent(&sample_response((2024, 3, 11), 9, None), anchor));
        assert!(!is_recent(&sample_response((2024, 3, 10), 9, None), anchor));
    }
}
