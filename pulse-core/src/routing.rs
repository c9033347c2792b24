//! Routes free-text symptoms to a specialty using the triage fact table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RoutingConfig;
use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::models::{
    FallbackReason, KnowledgeDomain, Predicate, Resolved, RoutingResult, Specialty, UrgencyLevel,
};

const DEFAULT_CONFIDENCE: f64 = 0.50;
const DEFAULT_URGENCY: f64 = 0.50;

#[derive(Debug, Clone)]
pub struct TriageRouter {
    kb: Arc<KnowledgeBase>,
    unroutable: Specialty,
    secondary_threshold: f64,
}

impl TriageRouter {
    pub fn new(kb: Arc<KnowledgeBase>, config: &RoutingConfig) -> Self {
        if kb.domain() != KnowledgeDomain::Triage {
            tracing::warn!(domain = %kb.domain(), "Triage router built over a non-triage table");
        }
        Self {
            kb,
            unroutable: config.unroutable_specialty,
            secondary_threshold: config.secondary_threshold,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Pick a specialty for `raw_symptoms`.
    ///
    /// Per-specialty score is the maximum of every matching route/combo
    /// weight. Ties go to the earlier entry of [`Specialty::ALL`]. When
    /// nothing scores, the configured unroutable specialty is returned as a
    /// [`Resolved::Fallback`].
    pub fn route(&self, raw_symptoms: &str, age: Option<u32>) -> Resolved<RoutingResult> {
        match self.try_route(raw_symptoms, age) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, "Routing failed, using unroutable default");
                Resolved::fallback(
                    self.default_result(DEFAULT_URGENCY, Vec::new(), None, 0),
                    FallbackReason::EngineError {
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    fn try_route(
        &self,
        raw_symptoms: &str,
        age: Option<u32>,
    ) -> Result<Resolved<RoutingResult>, KnowledgeError> {
        let normalized = self.kb.normalizer().normalize(raw_symptoms);
        let combination = normalized.combination();

        let mut scores: BTreeMap<Specialty, f64> = BTreeMap::new();
        let mut matched_keywords: Vec<String> = Vec::new();
        let mut rule_count: u32 = 0;

        let mut accumulate = |weights: Vec<(&'static str, f64)>| -> u32 {
            let mut fired = 0;
            for (target, weight) in weights {
                match target.parse::<Specialty>() {
                    Ok(specialty) => {
                        let score = scores.entry(specialty).or_insert(0.0);
                        *score = score.max(weight);
                        fired += 1;
                    }
                    Err(e) => tracing::warn!(error = %e, "Ignoring route weight"),
                }
            }
            fired
        };

        for tag in &normalized.tags {
            let fired = accumulate(self.kb.weighted(Predicate::RouteWeight, tag)?);
            if fired > 0 {
                matched_keywords.push(tag.to_string());
            }
            rule_count += fired;
        }
        if let Some(combo) = combination {
            rule_count += accumulate(self.kb.weighted(Predicate::ComboWeight, combo)?);
        }
        if matched_keywords.is_empty() {
            matched_keywords = normalized.tags.iter().map(|t| t.to_string()).collect();
        }

        // Urgency: strongest priority among tags and combination, then
        // additive age and severity boosts.
        let mut urgency = DEFAULT_URGENCY;
        for subject in normalized.tags.iter().copied().chain(combination) {
            for (_, weight) in self.kb.weighted(Predicate::UrgencyPriority, subject)? {
                urgency = urgency.max(weight);
            }
        }
        if let Some(bucket) = self.kb.age_bucket(age) {
            let boosts = self.kb.weighted(Predicate::AgeUrgencyBoost, bucket)?;
            rule_count += boosts.len() as u32;
            urgency += boosts.iter().map(|(_, w)| w).sum::<f64>();
        }
        for modifier in self.kb.normalizer().modifiers(raw_symptoms) {
            urgency += self
                .kb
                .weighted(Predicate::SeverityModifier, modifier)?
                .iter()
                .map(|(_, w)| w)
                .sum::<f64>();
        }
        let urgency = urgency.min(1.0);

        let Some((primary, confidence)) = best(&scores, None) else {
            tracing::warn!(
                fallback = %self.unroutable,
                "No specialty matched symptoms, using unroutable default"
            );
            return Ok(Resolved::fallback(
                self.default_result(
                    urgency,
                    matched_keywords,
                    combination.map(str::to_string),
                    rule_count,
                ),
                FallbackReason::NoSpecialtyMatched,
            ));
        };

        let secondary = best(&scores, Some(primary))
            .filter(|(_, score)| *score >= self.secondary_threshold)
            .map(|(specialty, _)| specialty);

        tracing::debug!(
            specialty = %primary,
            confidence,
            urgency,
            rules = rule_count,
            "Routed symptoms"
        );

        Ok(Resolved::Matched(RoutingResult {
            specialty: primary,
            confidence,
            urgency,
            matched_keywords,
            combination: combination.map(str::to_string),
            secondary_specialty: secondary,
            per_specialty_scores: scores,
            matched_rule_count: rule_count,
        }))
    }

    fn default_result(
        &self,
        urgency: f64,
        matched_keywords: Vec<String>,
        combination: Option<String>,
        matched_rule_count: u32,
    ) -> RoutingResult {
        RoutingResult {
            specialty: self.unroutable,
            confidence: DEFAULT_CONFIDENCE,
            urgency,
            matched_keywords,
            combination,
            secondary_specialty: None,
            per_specialty_scores: BTreeMap::new(),
            matched_rule_count,
        }
    }
}

/// Highest score in priority order, skipping `exclude`. Strictly greater
/// wins so earlier specialties keep ties.
fn best(
    scores: &BTreeMap<Specialty, f64>,
    exclude: Option<Specialty>,
) -> Option<(Specialty, f64)> {
    let mut winner: Option<(Specialty, f64)> = None;
    for specialty in Specialty::ALL {
        if Some(specialty) == exclude {
            continue;
        }
        let Some(&score) = scores.get(&specialty) else {
            continue;
        };
        match winner {
            Some((_, top)) if score <= top => {}
            _ => winner = Some((specialty, score)),
        }
    }
    winner
}

/// Human-readable explanation of a routing decision.
pub fn routing_reasoning(result: &RoutingResult, fallback: bool) -> String {
    let mut text = if fallback {
        format!(
            "No routing rule matched the described symptoms; defaulting to {} with {:.0}% confidence.",
            result.specialty.title(),
            result.confidence * 100.0
        )
    } else {
        format!(
            "Triage analysis routed symptoms to {} with {:.0}% confidence.",
            result.specialty.title(),
            result.confidence * 100.0
        )
    };

    if !result.matched_keywords.is_empty() {
        let keywords: Vec<String> = result
            .matched_keywords
            .iter()
            .map(|k| k.replace('_', " "))
            .collect();
        text.push_str(&format!(
            " Key symptoms identified: {}.",
            keywords.join(", ")
        ));
    }
    if let Some(combo) = &result.combination {
        text.push_str(&format!(
            " Significant symptom combination: {}.",
            combo.replace('_', " ").replace('+', " with ")
        ));
    }

    let alternatives: Vec<String> = result
        .per_specialty_scores
        .iter()
        .filter(|(s, _)| **s != result.specialty)
        .map(|(s, score)| format!("{} ({:.0}%)", s.title(), score * 100.0))
        .collect();
    if !alternatives.is_empty() {
        text.push_str(&format!(
            " Alternatives considered: {}.",
            alternatives.join(", ")
        ));
    }
    if let Some(secondary) = result.secondary_specialty {
        text.push_str(&format!(
            " A secondary {} consultation may be beneficial.",
            secondary.title()
        ));
    }

    text.push_str(&format!(
        " Evaluated {} routing rules. Urgency assessment: {}.",
        result.matched_rule_count,
        UrgencyLevel::from_score(result.urgency)
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeRegistry;
    use crate::models::Fact;
    use crate::normalizer::KeySource;

    fn router() -> TriageRouter {
        TriageRouter::new(KnowledgeRegistry::load().triage(), &RoutingConfig::default())
    }

    #[test]
    fn test_exertional_chest_pain_routes_to_cardiology() {
        let resolved = router().route(
            "I have severe chest pain when I exercise and shortness of breath",
            None,
        );
        assert!(!resolved.is_fallback());
        let result = resolved.into_value();
        assert_eq!(result.specialty, Specialty::Cardiology);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.combination.as_deref(), Some("chest_pain+exertional"));
        // 0.90 priority + 0.12 severe, capped
        assert_eq!(result.urgency, 1.0);
        assert_eq!(
            result.matched_keywords,
            vec!["chest_pain", "shortness_of_breath", "exertional"]
        );
        assert_eq!(result.matched_rule_count, 4);
    }

    #[test]
    fn test_rash_and_itching_routes_to_dermatology() {
        let result = router().route("itchy rash on my arm", None).into_value();
        assert_eq!(result.specialty, Specialty::Dermatology);
        assert_eq!(result.confidence, 0.93);
        assert_eq!(result.urgency, 0.50);
        assert_eq!(result.secondary_specialty, None);
    }

    #[test]
    fn test_unroutable_text_falls_back() {
        let resolved = router().route("I just feel off", None);
        assert_eq!(resolved.reason(), Some(&FallbackReason::NoSpecialtyMatched));
        let result = resolved.into_value();
        assert_eq!(result.specialty, Specialty::Cardiology);
        assert_eq!(result.confidence, 0.50);
        assert_eq!(result.urgency, 0.50);
        assert!(result.per_specialty_scores.is_empty());
    }

    #[test]
    fn test_fit_only_routes_as_a_whole_word() {
        let resolved = router().route("I want to improve my fitness and see the benefits", None);
        assert_eq!(resolved.reason(), Some(&FallbackReason::NoSpecialtyMatched));
        assert!(!resolved.value().matched_keywords.contains(&"seizure".to_string()));

        let result = router().route("my son had a fit this morning", None).into_value();
        assert_eq!(result.specialty, Specialty::Neurology);
        assert_eq!(result.matched_keywords, vec!["seizure"]);
    }

    #[test]
    fn test_unroutable_specialty_is_configurable() {
        let config = RoutingConfig {
            unroutable_specialty: Specialty::Neurology,
            ..RoutingConfig::default()
        };
        let router = TriageRouter::new(KnowledgeRegistry::load().triage(), &config);
        let result = router.route("nothing in particular", None).into_value();
        assert_eq!(result.specialty, Specialty::Neurology);
    }

    #[test]
    fn test_secondary_specialty_above_threshold() {
        let result = router()
            .route("headache and chest pain", None)
            .into_value();
        assert_eq!(result.specialty, Specialty::Cardiology);
        assert_eq!(result.secondary_specialty, Some(Specialty::Neurology));
        assert_eq!(result.per_specialty_scores[&Specialty::Neurology], 0.75);
    }

    #[test]
    fn test_ties_go_to_earlier_specialty() {
        let kb = KnowledgeBase::from_facts(
            KnowledgeDomain::Triage,
            [
                Fact::new(Predicate::RouteWeight, "rash", "dermatology", 0.80),
                Fact::new(Predicate::RouteWeight, "headache", "neurology", 0.80),
            ],
        );
        let router = TriageRouter::new(Arc::new(kb), &RoutingConfig::default());
        for _ in 0..5 {
            let result = router.route("headache with a rash", None).into_value();
            assert_eq!(result.specialty, Specialty::Neurology);
            assert_eq!(result.secondary_specialty, Some(Specialty::Dermatology));
        }
    }

    #[test]
    fn test_age_and_severity_boost_urgency() {
        let router = router();
        let young = router.route("mild headache", Some(30)).into_value();
        assert_eq!(young.urgency, 0.55);

        let old = router.route("sudden headache", Some(75)).into_value();
        assert!((old.urgency - (0.55 + 0.15 + 0.15)).abs() < 1e-9);
        assert_eq!(old.matched_rule_count, young.matched_rule_count + 1);

        let child = router.route("headache", Some(0)).into_value();
        assert!((child.urgency - 0.63).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weight_is_contained() {
        let kb = KnowledgeBase::from_facts(
            KnowledgeDomain::Triage,
            [Fact::new(Predicate::RouteWeight, "rash", "dermatology", -1.0)],
        );
        let router = TriageRouter::new(Arc::new(kb), &RoutingConfig::default());
        let resolved = router.route("rash", None);
        assert!(matches!(
            resolved.reason(),
            Some(FallbackReason::EngineError { .. })
        ));
        assert_eq!(resolved.value().specialty, Specialty::Cardiology);
    }

    #[test]
    fn test_reasoning_mentions_route_and_urgency() {
        let resolved = router().route("numbness and weakness in my left arm", Some(65));
        let text = routing_reasoning(resolved.value(), resolved.is_fallback());
        assert!(text.starts_with("Triage analysis routed symptoms to Neurology with 92% confidence."));
        assert!(text.contains("numbness, weakness"));
        assert!(text.contains(&format!("Urgency assessment: {}.", UrgencyLevel::Critical)));
    }

    #[test]
    fn test_general_key_has_no_combination() {
        let kb = KnowledgeRegistry::load().triage();
        let n = kb.normalizer().normalize("headache");
        assert_eq!(n.source, KeySource::Generic);
        assert_eq!(n.combination(), None);
    }
}
