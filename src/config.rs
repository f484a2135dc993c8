use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::models::CanonicalField;

pub const DEFAULT_REPRESENTATIVENESS_THRESHOLD: usize = 35;
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub key: String,
    pub label: String,
    pub group: String,
}

/// Header keyword → canonical field, matched case-insensitively. `exact`
/// rules must equal the whole header, the others match as a substring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub keyword: String,
    pub field: CanonicalField,
    #[serde(default)]
    pub exact: bool,
}

impl ColumnRule {
    /// `header` must already be trimmed and lowercased.
    pub fn matches(&self, header: &str) -> bool {
        let keyword = self.keyword.to_lowercase();
        if self.exact {
            header == keyword
        } else {
            header.contains(&keyword)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelRule {
    pub field: CanonicalField,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub representativeness_threshold: usize,
    pub timestamp_format: String,
    pub redact_email: bool,
    pub criteria: Vec<Criterion>,
    pub column_rules: Vec<ColumnRule>,
    pub sentinel_rules: Vec<SentinelRule>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            representativeness_threshold: DEFAULT_REPRESENTATIVENESS_THRESHOLD,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            redact_email: false,
            criteria: default_criteria(),
            column_rules: default_column_rules(),
            sentinel_rules: vec![SentinelRule {
                field: CanonicalField::Satisfaction("disponibilite_cours".to_string()),
                value: 0,
            }],
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: DashboardConfig =
            serde_json::from_str(raw).context("invalid dashboard configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.representativeness_threshold == 0 {
            bail!("representativeness_threshold must be a positive integer");
        }
        if self.timestamp_format.trim().is_empty() {
            bail!("timestamp_format must not be empty");
        }

        let mut keys = HashSet::new();
        for criterion in &self.criteria {
            if criterion.key.trim().is_empty() || criterion.key.contains(':') {
                bail!("invalid criterion key `{}`", criterion.key);
            }
            if !keys.insert(criterion.key.as_str()) {
                bail!("duplicate criterion key `{}`", criterion.key);
            }
        }

        for rule in &self.column_rules {
            if rule.keyword.trim().is_empty() {
                bail!("column rule for `{}` has an empty keyword", rule.field);
            }
            self.check_known_criterion(&rule.field)?;
        }
        for rule in &self.sentinel_rules {
            self.check_known_criterion(&rule.field)?;
        }
        Ok(())
    }

    fn check_known_criterion(&self, field: &CanonicalField) -> anyhow::Result<()> {
        if let CanonicalField::Satisfaction(key) = field {
            if self.criterion(key).is_none() {
                bail!("`{field}` refers to a criterion that is not declared");
            }
        }
        Ok(())
    }

    pub fn criterion(&self, key: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.key == key)
    }

    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for criterion in &self.criteria {
            if !groups.contains(&criterion.group.as_str()) {
                groups.push(criterion.group.as_str());
            }
        }
        groups
    }
}

fn criterion(key: &str, label: &str, group: &str) -> Criterion {
    Criterion {
        key: key.to_string(),
        label: label.to_string(),
        group: group.to_string(),
    }
}

fn default_criteria() -> Vec<Criterion> {
    vec![
        criterion("salle", "Expérience salle de sport", "Expérience"),
        criterion("piscine", "Expérience piscine", "Expérience"),
        criterion("coachs", "Les coachs", "Personnel"),
        criterion("maitres_nageurs", "Les maîtres nageurs", "Personnel"),
        criterion("accueil", "Personnel d'accueil", "Personnel"),
        criterion("conseiller", "Conseiller sports", "Personnel"),
        criterion("coaching_groupe", "Qualité coaching en groupe", "Services"),
        criterion("disponibilite_cours", "Disponibilité des cours", "Services"),
        criterion(
            "disponibilite_equipements",
            "Disponibilité équipements",
            "Services",
        ),
        criterion("restauration", "Offre restauration", "Services"),
        criterion("masterclass", "Masterclass / événements sportifs", "Services"),
        criterion("ambiance", "Ambiance générale", "Infrastructure"),
        criterion("proprete", "Propreté générale", "Infrastructure"),
        criterion("vestiaires", "Vestiaires", "Infrastructure"),
        criterion("festive", "Offre festive", "Infrastructure"),
    ]
}

fn rule(keyword: &str, field: CanonicalField) -> ColumnRule {
    ColumnRule {
        keyword: keyword.to_string(),
        field,
        exact: false,
    }
}

fn exact(keyword: &str, field: CanonicalField) -> ColumnRule {
    ColumnRule {
        exact: true,
        ..rule(keyword, field)
    }
}

fn satisfaction(key: &str) -> CanonicalField {
    CanonicalField::Satisfaction(key.to_string())
}

fn comment(slot: &str) -> CanonicalField {
    CanonicalField::Comment(slot.to_string())
}

// "votre prénom" contains "nom", so first-name rules precede last-name rules.
// Bare "nom" and "date" appear inside ordinary words and only match whole
// legacy headers.
fn default_column_rules() -> Vec<ColumnRule> {
    vec![
        rule("horodateur", CanonicalField::Timestamp),
        rule("adresse e-mail", CanonicalField::Email),
        rule("recommand", CanonicalField::Recommendation),
        rule("pourquoi cette note", comment("why_score")),
        rule(
            "probabilité que vous soyez toujours abonné",
            CanonicalField::Resubscription,
        ),
        rule("reabonnement", CanonicalField::Resubscription),
        rule("réabonnement", CanonicalField::Resubscription),
        rule("pourquoi cette réponse", comment("why_resubscription")),
        rule("salle de sport", satisfaction("salle")),
        rule("piscine", satisfaction("piscine")),
        rule("coaching en groupe", satisfaction("coaching_groupe")),
        rule("disponibilité des cours", satisfaction("disponibilite_cours")),
        rule(
            "disponibilité des équipements",
            satisfaction("disponibilite_equipements"),
        ),
        rule("coachs", satisfaction("coachs")),
        rule("maitres nageurs", satisfaction("maitres_nageurs")),
        rule("maîtres nageurs", satisfaction("maitres_nageurs")),
        rule("personnel d'accueil", satisfaction("accueil")),
        rule("conseiller sports", satisfaction("conseiller")),
        rule("ambiance générale", satisfaction("ambiance")),
        rule("propreté générale", satisfaction("proprete")),
        rule("vestiaires", satisfaction("vestiaires")),
        rule("offre de restauration", satisfaction("restauration")),
        rule("offre festive", satisfaction("festive")),
        rule("masterclass", satisfaction("masterclass")),
        rule("quelles améliorations proposeriez", comment("improvements")),
        rule("mots cles", comment("keywords")),
        rule("prénom", CanonicalField::FirstName),
        rule("prenom", CanonicalField::FirstName),
        rule("votre nom", CanonicalField::LastName),
        exact("nom", CanonicalField::LastName),
        rule("email", CanonicalField::Email),
        exact("date", CanonicalField::Timestamp),
    ]
}
