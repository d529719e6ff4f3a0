//! Case-definition rules as stored under `classification_rules` in
//! `config.yaml`.
//!
//! Every field carries a serde default: a missing or partially written
//! section loads as the permissive built-in definition instead of failing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationRules {
    pub confirmed: ConfirmedRule,
    pub probable: ProbableRule,
    pub suspected: SuspectedRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmedRule {
    /// A positive lab result is sufficient for Confirmed.
    pub lab_positive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbableRule {
    pub symptoms_required: Vec<String>,
    /// Older config files spell this `epidemiological_link_required`.
    #[serde(alias = "epidemiological_link_required")]
    pub epi_link_required: bool,
}

/// Fallback rule. Has no criteria; kept so the YAML mirrors the case
/// definition's three tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspectedRule {}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            confirmed: ConfirmedRule::default(),
            probable: ProbableRule::default(),
            suspected: SuspectedRule::default(),
        }
    }
}

impl Default for ConfirmedRule {
    fn default() -> Self {
        Self { lab_positive: true }
    }
}

impl Default for ProbableRule {
    fn default() -> Self {
        Self {
            symptoms_required: vec!["fever".into(), "cough".into()],
            epi_link_required: false,
        }
    }
}
