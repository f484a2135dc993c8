use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::DashboardConfig;
use crate::models::{CanonicalField, RawTable};
use crate::normalize::normalize_header;

const FIRST_NAMES: [&str; 6] = ["Jean", "Marie", "Pierre", "Sophie", "Thomas", "Julie"];
const LAST_NAMES: [&str; 5] = ["Martin", "Bernard", "Dubois", "Robert", "Richard"];
const SCORE_COMMENTS: [&str; 4] = ["Très bien", "Satisfaisant", "Peut mieux faire", "À améliorer"];
const RESUBSCRIPTION_COMMENTS: [&str; 3] = ["Je compte rester", "Peut-être", "Je vais changer"];

// Weights for scores 0..=10, skewed towards promoters.
const SCORE_WEIGHTS: [u32; 11] = [5, 5, 5, 5, 5, 5, 10, 10, 15, 15, 20];
// Weights for satisfaction 1..=5.
const SATISFACTION_WEIGHTS: [u32; 5] = [5, 10, 20, 30, 35];
const MISSING_SATISFACTION_RATE: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    pub months: u32,
    pub responses_per_month: u32,
    pub seed: u64,
    pub end: NaiveDateTime,
}

pub fn generate(options: &SyntheticOptions, config: &DashboardConfig) -> anyhow::Result<RawTable> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let score_dist = WeightedIndex::new(SCORE_WEIGHTS).context("invalid score weights")?;
    let satisfaction_dist =
        WeightedIndex::new(SATISFACTION_WEIGHTS).context("invalid satisfaction weights")?;

    let mut fields = vec![
        CanonicalField::Timestamp,
        CanonicalField::Email,
        CanonicalField::Recommendation,
        CanonicalField::Comment("why_score".to_string()),
        CanonicalField::Resubscription,
        CanonicalField::Comment("why_resubscription".to_string()),
    ];
    fields.extend(
        config
            .criteria
            .iter()
            .map(|c| CanonicalField::Satisfaction(c.key.clone())),
    );
    fields.push(CanonicalField::FirstName);
    fields.push(CanonicalField::LastName);

    let headers = fields.iter().map(|f| survey_header(f, config)).collect();
    let mut table = RawTable::new(headers);

    let span_days = i64::from(options.months.max(1)) * 30;
    let total = options
        .months
        .checked_mul(options.responses_per_month)
        .with_context(|| {
            format!(
                "{} months of {} responses is too many to generate",
                options.months, options.responses_per_month
            )
        })?;
    for _ in 0..total {
        let timestamp = options.end
            - Duration::days(rng.gen_range(0..span_days))
            - Duration::seconds(rng.gen_range(0..86_400));
        let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Jean");
        let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Martin");

        let row = fields
            .iter()
            .map(|field| match field {
                CanonicalField::Timestamp => {
                    timestamp.format(&config.timestamp_format).to_string()
                }
                CanonicalField::Email => {
                    format!("{}.{}@email.com", first.to_lowercase(), last.to_lowercase())
                }
                CanonicalField::Recommendation | CanonicalField::Resubscription => {
                    score_dist.sample(&mut rng).to_string()
                }
                CanonicalField::Comment(slot) if slot == "why_score" => {
                    pick(&SCORE_COMMENTS, &mut rng)
                }
                CanonicalField::Comment(_) => pick(&RESUBSCRIPTION_COMMENTS, &mut rng),
                CanonicalField::Satisfaction(_) => {
                    if rng.gen_bool(MISSING_SATISFACTION_RATE) {
                        String::new()
                    } else {
                        (satisfaction_dist.sample(&mut rng) + 1).to_string()
                    }
                }
                CanonicalField::FirstName => first.to_string(),
                CanonicalField::LastName => last.to_string(),
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

fn pick(options: &[&str], rng: &mut StdRng) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

/// Form-style header for `field`, falling back to the canonical name when the
/// configured rules would not map the form wording back to the same field.
fn survey_header(field: &CanonicalField, config: &DashboardConfig) -> String {
    let wording = match field {
        CanonicalField::Timestamp => "Horodateur".to_string(),
        CanonicalField::Email => "Adresse e-mail".to_string(),
        CanonicalField::Recommendation => {
            "Recommandation : quelle note de 0 à 10 donneriez-vous ?".to_string()
        }
        CanonicalField::Resubscription => {
            "Quelle est la probabilité que vous soyez toujours abonné dans un an ?".to_string()
        }
        CanonicalField::FirstName => "Votre prénom".to_string(),
        CanonicalField::LastName => "Votre Nom".to_string(),
        CanonicalField::Comment(slot) if slot == "why_score" => "Pourquoi cette note ?".to_string(),
        CanonicalField::Comment(slot) if slot == "why_resubscription" => {
            "Pourquoi cette réponse ?".to_string()
        }
        CanonicalField::Comment(_) => field.to_string(),
        CanonicalField::Satisfaction(_) => config
            .column_rules
            .iter()
            .find(|rule| &rule.field == field)
            .map(|rule| format!("Notez de 1 à 5 votre satisfaction [{}]", rule.keyword))
            .unwrap_or_else(|| field.to_string()),
    };

    if normalize_header(&wording, config).as_ref() == Some(field) {
        wording
    } else {
        field.to_string()
    }
}
