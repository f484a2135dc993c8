use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::category::{parse_integral, SCORE_RANGE};
use crate::config::DashboardConfig;
use crate::models::{CanonicalField, CanonicalResponse, RawTable};
use crate::normalize::{normalize_headers, ColumnTarget};

pub const RECOMMENDATION_RANGE: RangeInclusive<i64> = SCORE_RANGE;
pub const SATISFACTION_RANGE: RangeInclusive<i64> = 1..=5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub unreadable_rows: usize,
    pub kept_rows: usize,
    pub dropped_bad_timestamp: usize,
    pub dropped_bad_score: usize,
    pub sentinel_corrections: usize,
    pub unmapped_columns: Vec<String>,
    pub source_error: Option<String>,
}

impl LoadReport {
    pub fn dropped_rows(&self) -> usize {
        self.unreadable_rows + self.dropped_bad_timestamp + self.dropped_bad_score
    }

    fn absorb(&mut self, other: LoadReport) {
        self.total_rows += other.total_rows;
        self.unreadable_rows += other.unreadable_rows;
        self.kept_rows += other.kept_rows;
        self.dropped_bad_timestamp += other.dropped_bad_timestamp;
        self.dropped_bad_score += other.dropped_bad_score;
        self.sentinel_corrections += other.sentinel_corrections;
        for column in other.unmapped_columns {
            if !self.unmapped_columns.contains(&column) {
                self.unmapped_columns.push(column);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub responses: Vec<CanonicalResponse>,
    pub report: LoadReport,
}

/// Build a dataset from a source result. A failed source yields an empty
/// dataset with the failure recorded, never partial data.
pub fn load_dataset(source: anyhow::Result<RawTable>, config: &DashboardConfig) -> Dataset {
    load_tables(source.map(|table| vec![table]), config)
}

pub fn load_tables(source: anyhow::Result<Vec<RawTable>>, config: &DashboardConfig) -> Dataset {
    match source {
        Ok(tables) => {
            let mut dataset = Dataset::default();
            for table in &tables {
                let (responses, report) = clean_table(table, config);
                dataset.responses.extend(responses);
                dataset.report.absorb(report);
            }
            dataset
        }
        Err(err) => {
            let message = format!("{err:#}");
            error!(error = %message, "data source failed, continuing with an empty dataset");
            Dataset {
                responses: Vec::new(),
                report: LoadReport {
                    source_error: Some(message),
                    ..LoadReport::default()
                },
            }
        }
    }
}

pub fn clean_table(
    table: &RawTable,
    config: &DashboardConfig,
) -> (Vec<CanonicalResponse>, LoadReport) {
    let mapping = normalize_headers(&table.headers, config);
    let mut report = LoadReport {
        total_rows: table.rows.len() + table.unreadable_rows,
        unreadable_rows: table.unreadable_rows,
        unmapped_columns: mapping.extra_columns(),
        ..LoadReport::default()
    };

    let timestamp_col = mapping.index_of(&CanonicalField::Timestamp);
    let score_col = mapping.index_of(&CanonicalField::Recommendation);
    if timestamp_col.is_none() || score_col.is_none() {
        warn!(
            has_timestamp = timestamp_col.is_some(),
            has_recommendation = score_col.is_some(),
            "required column missing, every row will be dropped"
        );
    }

    let mut responses = Vec::with_capacity(table.rows.len());
    for (row_index, row) in table.rows.iter().enumerate() {
        let cell = |col: Option<usize>| col.map(|i| RawTable::cell(row, i)).unwrap_or("");

        let timestamp = match parse_timestamp(cell(timestamp_col), &config.timestamp_format) {
            Some(ts) => ts,
            None => {
                debug!(row = row_index + 1, value = cell(timestamp_col), "unparseable timestamp");
                report.dropped_bad_timestamp += 1;
                continue;
            }
        };

        let recommendation = coerce_score(
            cell(score_col),
            &CanonicalField::Recommendation,
            RECOMMENDATION_RANGE,
            config,
            &mut report.sentinel_corrections,
        );
        let Some(recommendation) = recommendation else {
            debug!(row = row_index + 1, value = cell(score_col), "unparseable recommendation score");
            report.dropped_bad_score += 1;
            continue;
        };

        let mut response = CanonicalResponse::new(timestamp, recommendation);
        for (col, target) in mapping.columns.iter().enumerate() {
            let value = RawTable::cell(row, col);
            match target {
                ColumnTarget::Field(CanonicalField::Timestamp)
                | ColumnTarget::Field(CanonicalField::Recommendation) => {}
                ColumnTarget::Field(field @ CanonicalField::Resubscription) => {
                    response.resubscription_score = coerce_score(
                        value,
                        field,
                        RECOMMENDATION_RANGE,
                        config,
                        &mut report.sentinel_corrections,
                    );
                }
                ColumnTarget::Field(field @ CanonicalField::Satisfaction(key)) => {
                    if let Some(score) = coerce_score(
                        value,
                        field,
                        SATISFACTION_RANGE,
                        config,
                        &mut report.sentinel_corrections,
                    ) {
                        response.satisfaction_scores.insert(key.clone(), score);
                    }
                }
                ColumnTarget::Field(CanonicalField::Email) => {
                    if !config.redact_email {
                        response.email = clean_text(value);
                    }
                }
                ColumnTarget::Field(CanonicalField::FirstName) => {
                    response.first_name = clean_text(value);
                }
                ColumnTarget::Field(CanonicalField::LastName) => {
                    response.last_name = clean_text(value);
                }
                ColumnTarget::Field(CanonicalField::Comment(slot)) => {
                    if let Some(text) = clean_text(value) {
                        response.comments.insert(slot.clone(), text);
                    }
                }
                ColumnTarget::Extra(name) => {
                    if let Some(text) = clean_text(value) {
                        response.extra_fields.entry(name.clone()).or_insert(text);
                    }
                }
            }
        }
        responses.push(response);
    }

    report.kept_rows = responses.len();
    if report.dropped_rows() > 0 {
        warn!(
            dropped = report.dropped_rows(),
            bad_timestamp = report.dropped_bad_timestamp,
            bad_score = report.dropped_bad_score,
            total = report.total_rows,
            "dropped malformed survey rows"
        );
    }
    (responses, report)
}

pub fn parse_timestamp(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), format).ok()
}

/// Numeric coercion shared by every scored field. Sentinel values are removed
/// before the range check; out-of-range values are absent, never clamped.
pub fn coerce_score(
    value: &str,
    field: &CanonicalField,
    range: RangeInclusive<i64>,
    config: &DashboardConfig,
    sentinel_corrections: &mut usize,
) -> Option<u8> {
    let parsed = parse_integral(value)?;
    if config
        .sentinel_rules
        .iter()
        .any(|rule| &rule.field == field && rule.value == parsed)
    {
        *sentinel_corrections += 1;
        return None;
    }
    if !range.contains(&parsed) {
        return None;
    }
    u8::try_from(parsed).ok()
}

fn clean_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Write canonical responses back out as a table with canonical headers.
/// Every slot the column rules can produce gets a column even when blank, so
/// an extra column never claims it when the result is cleaned again.
pub fn to_raw_table(responses: &[CanonicalResponse], config: &DashboardConfig) -> RawTable {
    let rule_slots = config.column_rules.iter().filter_map(|rule| match &rule.field {
        CanonicalField::Comment(slot) => Some(slot),
        _ => None,
    });
    let slots: BTreeSet<&String> = responses
        .iter()
        .flat_map(|r| r.comments.keys())
        .chain(rule_slots)
        .collect();
    let extras: BTreeSet<&String> = responses
        .iter()
        .flat_map(|r| r.extra_fields.keys())
        .collect();

    let mut fields = vec![
        CanonicalField::Timestamp,
        CanonicalField::Recommendation,
        CanonicalField::Resubscription,
        CanonicalField::FirstName,
        CanonicalField::LastName,
        CanonicalField::Email,
    ];
    fields.extend(
        config
            .criteria
            .iter()
            .map(|c| CanonicalField::Satisfaction(c.key.clone())),
    );
    fields.extend(slots.iter().map(|slot| CanonicalField::Comment((*slot).clone())));

    let mut headers: Vec<String> = fields.iter().map(ToString::to_string).collect();
    headers.extend(extras.iter().map(|name| (*name).clone()));

    let mut table = RawTable::new(headers);
    for response in responses {
        let mut row: Vec<String> = fields
            .iter()
            .map(|field| field_value(response, field, config))
            .collect();
        row.extend(
            extras
                .iter()
                .map(|name| response.extra_fields.get(*name).cloned().unwrap_or_default()),
        );
        table.push_row(row);
    }
    table
}

fn field_value(
    response: &CanonicalResponse,
    field: &CanonicalField,
    config: &DashboardConfig,
) -> String {
    match field {
        CanonicalField::Timestamp => response
            .timestamp
            .format(&config.timestamp_format)
            .to_string(),
        CanonicalField::Recommendation => response.recommendation_score.to_string(),
        CanonicalField::Resubscription => response
            .resubscription_score
            .map(|s| s.to_string())
            .unwrap_or_default(),
        CanonicalField::FirstName => response.first_name.clone().unwrap_or_default(),
        CanonicalField::LastName => response.last_name.clone().unwrap_or_default(),
        CanonicalField::Email => response.email.clone().unwrap_or_default(),
        CanonicalField::Satisfaction(key) => response
            .satisfaction(key)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        CanonicalField::Comment(slot) => response.comments.get(slot).cloned().unwrap_or_default(),
    }
}
