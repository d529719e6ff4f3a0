//! Case classification under a configurable case definition.
//!
//! Tiers are evaluated in a fixed order: Confirmed, then Probable, then the
//! Suspected fallback. A case meeting both the Confirmed and Probable
//! criteria is always Confirmed.

use crate::models::enums::{Classification, LabResult};
use crate::models::{CaseReport, ClassificationRules, SymptomSet};

/// Classify a report. `None` rules evaluate the built-in case definition.
pub fn classify(report: &CaseReport, rules: Option<&ClassificationRules>) -> Classification {
    classify_parts(report.lab_result, &report.symptoms, report.epi_link, rules)
}

/// Classify from raw symptom text, as submitted on the case form.
pub fn classify_text(
    lab_result: LabResult,
    symptoms: &str,
    epi_link: bool,
    rules: Option<&ClassificationRules>,
) -> Classification {
    classify_parts(lab_result, &SymptomSet::parse(symptoms), epi_link, rules)
}

/// The classification function proper. Pure over its inputs.
pub fn classify_parts(
    lab_result: LabResult,
    symptoms: &SymptomSet,
    epi_link: bool,
    rules: Option<&ClassificationRules>,
) -> Classification {
    let builtin;
    let rules = match rules {
        Some(r) => r,
        None => {
            builtin = ClassificationRules::default();
            &builtin
        }
    };

    if rules.confirmed.lab_positive && lab_result.is_positive() {
        return Classification::Confirmed;
    }

    let required: Vec<&str> = rules
        .probable
        .symptoms_required
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    // An empty requirement list must not match vacuously
    if !required.is_empty()
        && symptoms.contains_all(&required)
        && (!rules.probable.epi_link_required || epi_link)
    {
        return Classification::Probable;
    }

    Classification::Suspected
}

impl CaseReport {
    /// Recompute the label after an administrative correction.
    pub fn reclassify(&mut self, rules: Option<&ClassificationRules>) -> Classification {
        self.classification = classify(self, rules);
        self.classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbableRule;
    use proptest::prelude::*;

    fn rules_with(symptoms: &[&str], epi_link_required: bool) -> ClassificationRules {
        ClassificationRules {
            probable: ProbableRule {
                symptoms_required: symptoms.iter().map(|s| s.to_string()).collect(),
                epi_link_required,
            },
            ..Default::default()
        }
    }

    #[test]
    fn lab_positive_without_symptoms_is_confirmed() {
        let label = classify_text(LabResult::Positive, "", false, None);
        assert_eq!(label, Classification::Confirmed);
    }

    #[test]
    fn fever_and_cough_without_lab_is_probable() {
        let label = classify_text(LabResult::Negative, "fever,cough", false, None);
        assert_eq!(label, Classification::Probable);
    }

    #[test]
    fn confirmed_wins_over_probable() {
        let label = classify_text(LabResult::Positive, "fever;cough", true, None);
        assert_eq!(label, Classification::Confirmed);
    }

    #[test]
    fn lab_positivity_ignored_when_rule_disabled() {
        let mut rules = ClassificationRules::default();
        rules.confirmed.lab_positive = false;
        assert_eq!(
            classify_text(LabResult::Positive, "fever,cough", false, Some(&rules)),
            Classification::Probable
        );
        assert_eq!(
            classify_text(LabResult::Positive, "", false, Some(&rules)),
            Classification::Suspected
        );
    }

    #[test]
    fn presumed_result_is_not_confirmed() {
        let label = classify_text(LabResult::Presumed, "", false, None);
        assert_eq!(label, Classification::Suspected);
    }

    #[test]
    fn incomplete_symptoms_are_suspected() {
        for text in ["", "fever", "cough;rash", "feverish cough"] {
            assert_eq!(
                classify_text(LabResult::Unknown, text, false, None),
                Classification::Suspected,
                "symptoms {text:?}"
            );
        }
    }

    #[test]
    fn symptom_matching_is_case_and_whitespace_insensitive() {
        let rules = rules_with(&["Fever", " Cough "], false);
        let label = classify_text(LabResult::Negative, " FEVER ; cough ", false, Some(&rules));
        assert_eq!(label, Classification::Probable);
    }

    #[test]
    fn extra_symptoms_still_match() {
        let label = classify_text(LabResult::Negative, "rash,fever,cough,headache", false, None);
        assert_eq!(label, Classification::Probable);
    }

    #[test]
    fn epi_link_required_but_absent_is_suspected() {
        let rules = rules_with(&["fever", "cough"], true);
        assert_eq!(
            classify_text(LabResult::Negative, "fever,cough", false, Some(&rules)),
            Classification::Suspected
        );
        assert_eq!(
            classify_text(LabResult::Negative, "fever,cough", true, Some(&rules)),
            Classification::Probable
        );
    }

    #[test]
    fn empty_required_list_never_yields_probable() {
        let rules = rules_with(&[], false);
        assert_eq!(
            classify_text(LabResult::Negative, "fever,cough", false, Some(&rules)),
            Classification::Suspected
        );
        let blank = rules_with(&["", "  "], false);
        assert_eq!(
            classify_text(LabResult::Negative, "fever", false, Some(&blank)),
            Classification::Suspected
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = rules_with(&["fever"], false);
        let first = classify_text(LabResult::Unknown, "fever", false, Some(&rules));
        for _ in 0..10 {
            assert_eq!(
                classify_text(LabResult::Unknown, "fever", false, Some(&rules)),
                first
            );
        }
    }

    fn not_positive() -> impl Strategy<Value = LabResult> {
        prop::sample::select(vec![LabResult::Unknown, LabResult::Negative, LabResult::Presumed])
    }

    /// Symptom text lacking at least one of fever and cough.
    fn incomplete_symptoms() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-z]{1,8}", 0..6),
            prop::option::of(prop::sample::select(vec!["fever", "cough", " FEVER "])),
            prop::sample::select(vec![",", ";", " ; "]),
        )
            .prop_map(|(mut tokens, one_required, sep)| {
                tokens.retain(|t| t != "fever" && t != "cough");
                tokens.extend(one_required.map(str::to_string));
                tokens.join(sep)
            })
    }

    proptest! {
        #[test]
        fn positive_lab_is_always_confirmed(text in ".*", epi_link in any::<bool>()) {
            prop_assert_eq!(
                classify_text(LabResult::Positive, &text, epi_link, None),
                Classification::Confirmed
            );
        }

        #[test]
        fn incomplete_symptoms_are_always_suspected(
            lab in not_positive(),
            text in incomplete_symptoms(),
            epi_link in any::<bool>(),
        ) {
            prop_assert_eq!(
                classify_text(lab, &text, epi_link, None),
                Classification::Suspected
            );
        }
    }
}
