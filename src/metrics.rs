use std::collections::BTreeMap;

use serde::Serialize;

use crate::category::NpsCategory;
use crate::config::DashboardConfig;
use crate::models::{CanonicalResponse, YearMonth};

pub const DEFAULT_TOP_BOTTOM: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub promoters: usize,
    pub passives: usize,
    pub detractors: usize,
}

impl CategoryCounts {
    pub fn total(&self) -> usize {
        self.promoters + self.passives + self.detractors
    }

    pub fn nps(&self) -> Option<i32> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let net = self.promoters as f64 - self.detractors as f64;
        Some((net * 100.0 / total as f64).round() as i32)
    }

    fn add(&mut self, category: NpsCategory) {
        match category {
            NpsCategory::Promoter => self.promoters += 1,
            NpsCategory::Passive => self.passives += 1,
            NpsCategory::Detractor => self.detractors += 1,
            NpsCategory::Unknown => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceScore {
    pub key: String,
    pub label: String,
    pub group: String,
    pub average: f64,
    pub trend: Option<f64>,
    pub responses: usize,
}

/// Best and worst criteria. `bottom` is worst first. With fewer than `2n`
/// rated criteria the two lists overlap; with fewer than `n` they shrink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopBottom {
    pub top: Vec<ServiceScore>,
    pub bottom: Vec<ServiceScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatisfactionBreakdown {
    pub satisfied_pct: f64,
    pub neutral_pct: f64,
    pub dissatisfied_pct: f64,
    pub responses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub month: YearMonth,
    pub counts: CategoryCounts,
    pub nps: Option<i32>,
    pub responses: usize,
    pub representative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpsComparison {
    pub current_month: YearMonth,
    pub previous_month: YearMonth,
    pub current_nps: Option<i32>,
    pub previous_nps: Option<i32>,
    pub delta: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAverage {
    pub group: String,
    pub average: Option<f64>,
    pub rated_criteria: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionSnapshot {
    pub key: String,
    pub label: String,
    pub group: String,
    pub average: Option<f64>,
    pub trend: Option<f64>,
    pub responses: usize,
    pub breakdown: Option<SatisfactionBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub response_count: usize,
    pub nps: Option<i32>,
    pub representative: bool,
    pub current_month: Option<YearMonth>,
    pub resubscription_average: Option<f64>,
    pub criteria: Vec<CriterionSnapshot>,
}

pub fn category_counts<'a>(
    responses: impl IntoIterator<Item = &'a CanonicalResponse>,
) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for response in responses {
        counts.add(response.category());
    }
    counts
}

pub fn global_nps(subset: &[CanonicalResponse]) -> Option<i32> {
    category_counts(subset).nps()
}

fn average_of<'a>(
    responses: impl IntoIterator<Item = &'a CanonicalResponse>,
    criterion: &str,
) -> Option<f64> {
    let (sum, count) = responses
        .into_iter()
        .filter_map(|r| r.satisfaction(criterion))
        .fold((0u32, 0usize), |(sum, count), score| {
            (sum + u32::from(score), count + 1)
        });
    if count == 0 {
        None
    } else {
        Some(f64::from(sum) / count as f64)
    }
}

pub fn criterion_average(subset: &[CanonicalResponse], criterion: &str) -> Option<f64> {
    average_of(subset, criterion)
}

pub fn criterion_responses(subset: &[CanonicalResponse], criterion: &str) -> usize {
    subset
        .iter()
        .filter(|r| r.satisfaction(criterion).is_some())
        .count()
}

/// Difference between two monthly averages. `None` when either month has no
/// rating for `criterion`.
pub fn trend_delta(
    subset: &[CanonicalResponse],
    criterion: &str,
    current: YearMonth,
    previous: YearMonth,
) -> Option<f64> {
    let current_avg = average_of(
        subset.iter().filter(|r| current.contains(&r.timestamp)),
        criterion,
    )?;
    let previous_avg = average_of(
        subset.iter().filter(|r| previous.contains(&r.timestamp)),
        criterion,
    )?;
    Some(current_avg - previous_avg)
}

pub fn current_month(subset: &[CanonicalResponse]) -> Option<YearMonth> {
    subset.iter().map(CanonicalResponse::month).max()
}

/// Trend of `criterion` between the latest month in the data and the
/// calendar month before it.
pub fn month_over_month_trend(subset: &[CanonicalResponse], criterion: &str) -> Option<f64> {
    let current = current_month(subset)?;
    trend_delta(subset, criterion, current, current.previous())
}

pub fn is_representative(count: usize, threshold: usize) -> bool {
    count >= threshold
}

fn service_scores(subset: &[CanonicalResponse], config: &DashboardConfig) -> Vec<ServiceScore> {
    config
        .criteria
        .iter()
        .filter_map(|criterion| {
            let average = criterion_average(subset, &criterion.key)?;
            Some(ServiceScore {
                key: criterion.key.clone(),
                label: criterion.label.clone(),
                group: criterion.group.clone(),
                average,
                trend: month_over_month_trend(subset, &criterion.key),
                responses: criterion_responses(subset, &criterion.key),
            })
        })
        .collect()
}

/// Rank rated criteria by average. Equal averages keep declaration order.
pub fn top_bottom_services(
    subset: &[CanonicalResponse],
    config: &DashboardConfig,
    n: usize,
) -> TopBottom {
    let mut ranked = service_scores(subset, config);
    ranked.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    TopBottom {
        top: ranked.iter().take(n).cloned().collect(),
        bottom: ranked.iter().rev().take(n).cloned().collect(),
    }
}

pub fn satisfaction_breakdown(
    subset: &[CanonicalResponse],
    criterion: &str,
) -> Option<SatisfactionBreakdown> {
    let scores: Vec<u8> = subset
        .iter()
        .filter_map(|r| r.satisfaction(criterion))
        .collect();
    if scores.is_empty() {
        return None;
    }
    let total = scores.len() as f64;
    let pct = |pred: fn(u8) -> bool| scores.iter().filter(|s| pred(**s)).count() as f64 / total * 100.0;
    Some(SatisfactionBreakdown {
        satisfied_pct: pct(|s| s >= 4),
        neutral_pct: pct(|s| s == 3),
        dissatisfied_pct: pct(|s| s <= 2),
        responses: scores.len(),
    })
}

pub fn monthly_series(subset: &[CanonicalResponse], threshold: usize) -> Vec<MonthlyBucket> {
    let mut months: BTreeMap<YearMonth, CategoryCounts> = BTreeMap::new();
    for response in subset {
        months
            .entry(response.month())
            .or_default()
            .add(response.category());
    }

    months
        .into_iter()
        .map(|(month, counts)| MonthlyBucket {
            month,
            counts,
            nps: counts.nps(),
            responses: counts.total(),
            representative: is_representative(counts.total(), threshold),
        })
        .collect()
}

pub fn nps_month_over_month(subset: &[CanonicalResponse]) -> Option<NpsComparison> {
    let current = current_month(subset)?;
    let previous = current.previous();
    let nps_in = |month: YearMonth| {
        category_counts(subset.iter().filter(|r| month.contains(&r.timestamp))).nps()
    };
    let current_nps = nps_in(current);
    let previous_nps = nps_in(previous);
    Some(NpsComparison {
        current_month: current,
        previous_month: previous,
        current_nps,
        previous_nps,
        delta: current_nps.zip(previous_nps).map(|(c, p)| c - p),
    })
}

pub fn group_averages(subset: &[CanonicalResponse], config: &DashboardConfig) -> Vec<GroupAverage> {
    config
        .groups()
        .into_iter()
        .map(|group| {
            let averages: Vec<f64> = config
                .criteria
                .iter()
                .filter(|c| c.group == group)
                .filter_map(|c| criterion_average(subset, &c.key))
                .collect();
            GroupAverage {
                group: group.to_string(),
                average: if averages.is_empty() {
                    None
                } else {
                    Some(averages.iter().sum::<f64>() / averages.len() as f64)
                },
                rated_criteria: averages.len(),
            }
        })
        .collect()
}

pub fn resubscription_average(subset: &[CanonicalResponse]) -> Option<f64> {
    let scores: Vec<f64> = subset
        .iter()
        .filter_map(|r| r.resubscription_score.map(f64::from))
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub fn snapshot(subset: &[CanonicalResponse], config: &DashboardConfig) -> MetricSnapshot {
    let criteria = config
        .criteria
        .iter()
        .map(|criterion| CriterionSnapshot {
            key: criterion.key.clone(),
            label: criterion.label.clone(),
            group: criterion.group.clone(),
            average: criterion_average(subset, &criterion.key),
            trend: month_over_month_trend(subset, &criterion.key),
            responses: criterion_responses(subset, &criterion.key),
            breakdown: satisfaction_breakdown(subset, &criterion.key),
        })
        .collect();

    MetricSnapshot {
        response_count: subset.len(),
        nps: global_nps(subset),
        representative: is_representative(subset.len(), config.representativeness_threshold),
        current_month: current_month(subset),
        resubscription_average: resubscription_average(subset),
        criteria,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_response(date: (i32, u32, u32), score: u8) -> CanonicalResponse {
        let timestamp = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        CanonicalResponse::new(timestamp, score)
    }

    fn rated(date: (i32, u32, u32), criterion: &str, value: Option<u8>) -> CanonicalResponse {
        let mut response = sample_response(date, 8);
        if let Some(v) = value {
            response.satisfaction_scores.insert(criterion.to_string(), v);
        }
        response
    }

    #[test]
    fn nps_counts_promoters_minus_detractors() {
        let subset: Vec<_> = [9, 9, 6, 6, 6]
            .into_iter()
            .map(|s| sample_response((2024, 3, 1), s))
            .collect();
        assert_eq!(global_nps(&subset), Some(-20));
        assert_eq!(global_nps(&subset), global_nps(&subset));
    }

    #[test]
    fn nps_without_responses_is_no_data() {
        assert_eq!(global_nps(&[]), None);
    }

    #[test]
    fn nps_after_dropping_bad_score_row() {
        use crate::clean::clean_table;
        use crate::config::DashboardConfig;
        use crate::models::RawTable;

        let mut raw = RawTable::new(vec!["timestamp".to_string(), "recommendation".to_string()]);
        for score in ["10", "10", "10", "10", "abc"] {
            raw.push_row(vec!["01/03/2024 10:00:00".to_string(), score.to_string()]);
        }
        let (responses, report) = clean_table(&raw, &DashboardConfig::default());
        assert_eq!(report.dropped_bad_score, 1);
        assert_eq!(responses.len(), 4);
        assert_eq!(global_nps(&responses), Some(100));
    }

    #[test]
    fn average_ignores_absent_values() {
        let subset: Vec<_> = [Some(5), Some(4), None, None, Some(3)]
            .into_iter()
            .map(|v| rated((2024, 3, 1), "coachs", v))
            .collect();
        let average = criterion_average(&subset, "coachs").unwrap();
        assert!((average - 4.0).abs() < 1e-9);
        assert_eq!(criterion_responses(&subset, "coachs"), 3);
    }

    #[test]
    fn average_of_unrated_criterion_is_no_data() {
        let subset = vec![rated((2024, 3, 1), "coachs", None)];
        assert_eq!(criterion_average(&subset, "coachs"), None);
        assert_eq!(satisfaction_breakdown(&subset, "coachs"), None);
    }

    #[test]
    fn representativeness_uses_threshold() {
        assert!(!is_representative(20, 35));
        assert!(is_representative(40, 35));
        assert!(is_representative(35, 35));
    }

    #[test]
    fn trend_without_previous_month_is_undefined() {
        let subset = vec![
            rated((2024, 3, 2), "coachs", Some(4)),
            rated((2024, 3, 9), "coachs", Some(5)),
        ];
        let current = YearMonth::new(2024, 3);
        assert_eq!(trend_delta(&subset, "coachs", current, current.previous()), None);

        let mut with_previous = subset.clone();
        with_previous.push(rated((2024, 2, 20), "coachs", Some(4)));
        with_previous.push(rated((2024, 2, 21), "coachs", Some(5)));
        let delta = trend_delta(&with_previous, "coachs", current, current.previous());
        assert_eq!(delta, Some(0.0));
    }

    #[test]
    fn current_month_comes_from_data() {
        let subset = vec![
            sample_response((2021, 11, 3), 9),
            sample_response((2022, 1, 15), 9),
            sample_response((2021, 12, 31), 9),
        ];
        assert_eq!(current_month(&subset), Some(YearMonth::new(2022, 1)));
        assert_eq!(current_month(&[]), None);
    }

    #[test]
    fn ranking_breaks_ties_by_declaration_order() {
        let config = DashboardConfig::default();
        let mut subset = Vec::new();
        for (key, value) in [
            ("salle", 4),
            ("piscine", 5),
            ("coachs", 4),
            ("accueil", 2),
            ("vestiaires", 3),
        ] {
            subset.push(rated((2024, 3, 1), key, Some(value)));
        }
        let ranking = top_bottom_services(&subset, &config, 3);
        let top: Vec<&str> = ranking.top.iter().map(|s| s.key.as_str()).collect();
        let bottom: Vec<&str> = ranking.bottom.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(top, vec!["piscine", "salle", "coachs"]);
        assert_eq!(bottom, vec!["accueil", "vestiaires", "coachs"]);
    }

    #[test]
    fn ranking_shrinks_with_few_rated_criteria() {
        let config = DashboardConfig::default();
        let subset = vec![rated((2024, 3, 1), "coachs", Some(4))];
        let ranking = top_bottom_services(&subset, &config, 3);
        assert_eq!(ranking.top.len(), 1);
        assert_eq!(ranking.bottom.len(), 1);
        assert!(top_bottom_services(&[], &config, 3).top.is_empty());
    }

    #[test]
    fn breakdown_splits_satisfaction_bands() {
        let subset: Vec<_> = [5, 4, 3, 2]
            .into_iter()
            .map(|v| rated((2024, 3, 1), "coachs", Some(v)))
            .collect();
        let breakdown = satisfaction_breakdown(&subset, "coachs").unwrap();
        assert_eq!(breakdown.satisfied_pct, 50.0);
        assert_eq!(breakdown.neutral_pct, 25.0);
        assert_eq!(breakdown.dissatisfied_pct, 25.0);
        assert_eq!(breakdown.responses, 4);
    }

    #[test]
    fn monthly_series_flags_small_months() {
        let mut subset = vec![sample_response((2024, 1, 5), 10)];
        subset.extend((0..3).map(|_| sample_response((2024, 2, 5), 3)));
        let series = monthly_series(&subset, 2);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].month, YearMonth::new(2024, 1));
        assert_eq!(series[0].nps, Some(100));
        assert!(!series[0].representative);
        assert_eq!(series[1].counts.detractors, 3);
        assert_eq!(series[1].nps, Some(-100));
        assert!(series[1].representative);
    }

    #[test]
    fn month_over_month_nps_needs_both_months() {
        let subset = vec![
            sample_response((2024, 2, 5), 9),
            sample_response((2024, 3, 5), 6),
        ];
        let comparison = nps_month_over_month(&subset).unwrap();
        assert_eq!(comparison.current_nps, Some(-100));
        assert_eq!(comparison.previous_nps, Some(100));
        assert_eq!(comparison.delta, Some(-200));

        let gap = vec![
            sample_response((2024, 1, 5), 9),
            sample_response((2024, 3, 5), 6),
        ];
        assert_eq!(nps_month_over_month(&gap).unwrap().delta, None);
    }

    #[test]
    fn group_and_resubscription_averages() {
        let config = DashboardConfig::default();
        let mut first = rated((2024, 3, 1), "salle", Some(4));
        first.satisfaction_scores.insert("piscine".to_string(), 2);
        first.resubscription_score = Some(8);
        let second = rated((2024, 3, 2), "salle", Some(5));
        let subset = vec![first, second];

        let groups = group_averages(&subset, &config);
        assert_eq!(groups[0].group, "Expérience");
        assert_eq!(groups[0].average, Some((4.5 + 2.0) / 2.0));
        assert_eq!(groups[1].average, None);
        assert_eq!(resubscription_average(&subset), Some(8.0));
    }

    #[test]
    fn snapshot_reports_no_data_explicitly() {
        let config = DashboardConfig::default();
        let empty = snapshot(&[], &config);
        assert_eq!(empty.nps, None);
        assert!(!empty.representative);
        assert!(empty.criteria.iter().all(|c| c.average.is_none()));

        let json = serde_json::to_value(&empty).unwrap();
        assert!(json["nps"].is_null());
    }
}
