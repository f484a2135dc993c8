use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::DashboardConfig;
use crate::models::CanonicalField;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTarget {
    Field(CanonicalField),
    Extra(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMapping {
    pub columns: Vec<ColumnTarget>,
}

impl ColumnMapping {
    pub fn index_of(&self, field: &CanonicalField) -> Option<usize> {
        self.columns
            .iter()
            .position(|target| matches!(target, ColumnTarget::Field(f) if f == field))
    }

    pub fn extra_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(|target| match target {
                ColumnTarget::Extra(name) => Some(name.clone()),
                ColumnTarget::Field(_) => None,
            })
            .collect()
    }
}

/// A canonical header name maps to itself; otherwise the first matching
/// keyword rule wins.
pub fn normalize_header(header: &str, config: &DashboardConfig) -> Option<CanonicalField> {
    let trimmed = header.trim();
    if let Ok(field) = trimmed.parse::<CanonicalField>() {
        let known = match &field {
            CanonicalField::Satisfaction(key) => config.criterion(key).is_some(),
            _ => true,
        };
        if known {
            return Some(field);
        }
    }

    let lowered = trimmed.to_lowercase();
    let mut matches = config
        .column_rules
        .iter()
        .filter(|rule| rule.matches(&lowered));

    let first = matches.next()?;
    let others: Vec<String> = matches
        .filter(|rule| rule.field != first.field)
        .map(|rule| rule.field.to_string())
        .collect();
    if !others.is_empty() {
        debug!(
            header = trimmed,
            chosen = %first.field,
            also_matched = ?others,
            "ambiguous column header, first rule wins"
        );
    }
    Some(first.field.clone())
}

pub fn normalize_headers(headers: &[String], config: &DashboardConfig) -> ColumnMapping {
    let mut claimed: HashSet<CanonicalField> = HashSet::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (index, header) in headers.iter().enumerate() {
        let target = match normalize_header(header, config) {
            Some(field) if claimed.insert(field.clone()) => ColumnTarget::Field(field),
            Some(field) => {
                warn!(
                    header = header.as_str(),
                    field = %field,
                    "column maps to an already claimed field, keeping it as an extra column"
                );
                ColumnTarget::Extra(extra_name(header, index))
            }
            None => ColumnTarget::Extra(extra_name(header, index)),
        };
        columns.push(target);
    }

    ColumnMapping { columns }
}

fn extra_name(header: &str, index: usize) -> String {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        format!("column_{}", index + 1)
    } else {
        trimmed.to_string()
    }
}
