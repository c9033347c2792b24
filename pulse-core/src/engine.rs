//! Rule-based specialist analysis over a [`KnowledgeBase`].

use std::sync::Arc;

use crate::knowledge::{KnowledgeBase, KnowledgeError, SpecialtyProfile};
use crate::models::{AnalysisResult, FallbackReason, Resolved, Specialty};

const FALLBACK_CONFIDENCE: f64 = 0.50;
const FALLBACK_URGENCY: f64 = 0.50;

#[derive(Debug, Clone)]
pub struct ReasoningEngine {
    kb: Arc<KnowledgeBase>,
    profile: &'static SpecialtyProfile,
}

impl ReasoningEngine {
    /// Fails when `kb` has no specialist profile (the triage table).
    pub fn new(kb: Arc<KnowledgeBase>) -> Result<Self, KnowledgeError> {
        let profile = kb.profile()?;
        Ok(Self { kb, profile })
    }

    pub fn specialty(&self) -> Specialty {
        self.profile.specialty
    }

    pub fn profile(&self) -> &'static SpecialtyProfile {
        self.profile
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Analyze free-text symptoms. Lookup failures never escape: they are
    /// reported as [`Resolved::Fallback`] with the specialty's safe default.
    pub fn analyze(
        &self,
        raw_symptoms: &str,
        age: Option<u32>,
        risk_factors: &[String],
    ) -> Resolved<AnalysisResult> {
        match self.try_analyze(raw_symptoms, age, risk_factors) {
            Ok(result) => Resolved::Matched(result),
            Err(e) => {
                tracing::warn!(
                    specialty = %self.specialty(),
                    error = %e,
                    "Analysis failed, using fallback result"
                );
                Resolved::fallback(
                    self.fallback_result(),
                    FallbackReason::EngineError {
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    fn try_analyze(
        &self,
        raw_symptoms: &str,
        age: Option<u32>,
        risk_factors: &[String],
    ) -> Result<AnalysisResult, KnowledgeError> {
        let normalized = self.kb.normalizer().normalize(raw_symptoms);
        let key = normalized.key;

        // The condition match (or its default) always counts as one rule.
        let mut rule_count: u32 = 1;

        let condition = self.kb.condition_for(key)?.into_value();
        let risk = self
            .kb
            .risk_boost(condition.condition, risk_factors, age)?;
        let final_confidence = (condition.confidence + risk.boost).min(1.0);

        let urgency = self.kb.urgency_for(key)?;
        if !urgency.is_fallback() {
            rule_count += 1;
        }
        rule_count += risk.matched_factors.len() as u32;

        let recommendations = self
            .kb
            .recommendations_for(condition.condition)?
            .into_value();

        tracing::debug!(
            specialty = %self.specialty(),
            key = %key,
            condition = %condition.condition,
            confidence = final_confidence,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            specialty: self.specialty(),
            symptom_key: key.to_string(),
            condition: condition.condition.to_string(),
            base_confidence: condition.confidence,
            risk_boost: risk.boost,
            final_confidence,
            urgency: urgency.into_value(),
            matched_rule_count: rule_count,
            risk_factors_found: risk.matched_factors,
            recommendations,
        })
    }

    fn fallback_result(&self) -> AnalysisResult {
        AnalysisResult {
            specialty: self.specialty(),
            symptom_key: self.kb.normalizer().vocabulary().generic_key.to_string(),
            condition: self.profile.default_condition.to_string(),
            base_confidence: FALLBACK_CONFIDENCE,
            risk_boost: 0.0,
            final_confidence: FALLBACK_CONFIDENCE,
            urgency: FALLBACK_URGENCY,
            matched_rule_count: 1,
            risk_factors_found: Vec::new(),
            recommendations: self
                .profile
                .default_recommendations
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }
}
