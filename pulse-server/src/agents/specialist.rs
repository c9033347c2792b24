use async_trait::async_trait;
use pulse_core::knowledge::SpecialtyProfile;
use pulse_core::models::{title_case, AnalysisResult};
use pulse_core::protocol::{AgentMessage, SpecialistAnalysisRequest, SpecialistAnalysisResponse};
use pulse_core::{enhance_or_original, EnhancementRequest, ReasoningEngine, TextEnhancer};
use std::sync::Arc;

use super::{health_response, Agent};

/// Technical diagnosis built from the analysis, before any enhancement.
pub fn diagnosis_text(
    analysis: &AnalysisResult,
    medical_history: &[String],
    profile: &SpecialtyProfile,
) -> String {
    let confidence = analysis.final_confidence * 100.0;
    let mut text = format!(
        "Based on the reasoning analysis, patient symptoms suggest possible {}.",
        title_case(&analysis.condition)
    );

    if analysis.final_confidence >= 0.80 {
        text.push_str(&format!(
            " The confidence level is high ({:.0}%) based on symptom pattern matching and risk factor analysis.",
            confidence
        ));
    } else if analysis.final_confidence >= 0.60 {
        text.push_str(&format!(
            " The confidence level is moderate to high ({:.0}%).",
            confidence
        ));
    } else {
        text.push_str(&format!(" The confidence level is moderate ({:.0}%).", confidence));
    }

    if !medical_history.is_empty() {
        let named: Vec<&str> = medical_history.iter().take(2).map(|s| s.as_str()).collect();
        text.push_str(&format!(
            " Patient has {} significant risk factors including {}.",
            medical_history.len(),
            named.join(", ")
        ));
    }

    if let Some(note) = profile.condition_note(&analysis.condition) {
        text.push(' ');
        text.push_str(note);
    }
    text
}

pub fn reasoning_summary(analysis: &AnalysisResult) -> String {
    let mut summary = format!(
        "Analysis identified {} with {:.0}% confidence.",
        analysis.condition.replace('_', " "),
        analysis.final_confidence * 100.0
    );
    if !analysis.risk_factors_found.is_empty() {
        summary.push_str(&format!(
            " Risk factors: {}.",
            analysis.risk_factors_found.join(", ")
        ));
    }
    summary.push_str(&format!(
        " Evaluated {} medical reasoning rules.",
        analysis.matched_rule_count
    ));
    summary
}

pub struct SpecialistAgent {
    name: String,
    engine: ReasoningEngine,
    enhancer: Arc<dyn TextEnhancer>,
}

impl SpecialistAgent {
    pub fn new(
        name: impl Into<String>,
        engine: ReasoningEngine,
        enhancer: Arc<dyn TextEnhancer>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            enhancer,
        }
    }

    pub async fn analyze(&self, request: &SpecialistAnalysisRequest) -> SpecialistAnalysisResponse {
        let specialty = self.engine.specialty();
        let resolved = self.engine.analyze(
            &request.symptoms,
            request.patient_age,
            &request.medical_history,
        );
        if let Some(reason) = resolved.reason() {
            tracing::warn!(
                session_id = %request.session_id,
                specialty = %specialty,
                ?reason,
                "Specialist analysis used the fallback result"
            );
        }
        let analysis = resolved.into_value();
        let profile = self.engine.profile();

        let technical = diagnosis_text(&analysis, &request.medical_history, profile);
        let enhancement = EnhancementRequest {
            technical_diagnosis: technical,
            matched_rules: analysis.matched_rule_count,
            risk_factors: analysis.risk_factors_found.clone(),
            confidence: analysis.final_confidence,
            recommendations: analysis.recommendations.clone(),
        };
        let diagnosis = enhance_or_original(self.enhancer.as_ref(), &enhancement).await;

        tracing::info!(
            session_id = %request.session_id,
            specialty = %specialty,
            condition = %analysis.condition,
            confidence = analysis.final_confidence,
            enhanced = diagnosis.enhanced,
            "Specialist analysis complete"
        );

        SpecialistAnalysisResponse {
            specialty: specialty.as_str().to_string(),
            diagnosis: diagnosis.text,
            reasoning_summary: reasoning_summary(&analysis),
            risk_level: profile.risk_level(analysis.urgency),
            condition: analysis.condition,
            confidence: analysis.final_confidence,
            urgency_score: analysis.urgency,
            recommendations: analysis.recommendations,
            rules_matched: analysis.matched_rule_count,
            risk_factors: analysis.risk_factors_found,
            enhanced: diagnosis.enhanced,
            session_id: request.session_id.clone(),
        }
    }
}

#[async_trait]
impl Agent for SpecialistAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: AgentMessage) -> Option<AgentMessage> {
        match message {
            AgentMessage::SpecialistAnalysisRequest(request) => Some(
                AgentMessage::SpecialistAnalysisResponse(self.analyze(&request).await),
            ),
            AgentMessage::HealthCheck(_) => {
                let loaded = self.engine.knowledge().fact_count() > 0;
                Some(AgentMessage::HealthResponse(health_response(
                    &self.name,
                    loaded,
                    self.enhancer.is_available(),
                )))
            }
            other => {
                tracing::warn!(agent = %self.name, kind = other.kind(), "Unexpected message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::enhancer::{DisabledEnhancer, EnhancerError};
    use pulse_core::models::{Specialty, UrgencyLevel};
    use pulse_core::KnowledgeRegistry;

    struct FixedEnhancer(Option<String>);

    #[async_trait]
    impl TextEnhancer for FixedEnhancer {
        async fn enhance(
            &self,
            _request: &EnhancementRequest,
        ) -> Result<Option<String>, EnhancerError> {
            Ok(self.0.clone())
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn specialist(specialty: Specialty, enhancer: Arc<dyn TextEnhancer>) -> SpecialistAgent {
        let engine = ReasoningEngine::new(KnowledgeRegistry::load().specialty(specialty)).unwrap();
        SpecialistAgent::new(specialty.as_str(), engine, enhancer)
    }

    fn request(symptoms: &str, age: Option<u32>, history: &[&str]) -> SpecialistAnalysisRequest {
        SpecialistAnalysisRequest {
            symptoms: symptoms.to_string(),
            patient_age: age,
            patient_gender: None,
            medical_history: history.iter().map(|s| s.to_string()).collect(),
            session_id: "s-7".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cardiology_angina_response() {
        let agent = specialist(Specialty::Cardiology, Arc::new(DisabledEnhancer));
        let response = agent
            .analyze(&request(
                "I have severe chest pain when I exercise and shortness of breath",
                Some(45),
                &["hypertension", "diabetes"],
            ))
            .await;

        assert_eq!(response.specialty, "cardiology");
        assert_eq!(response.condition, "angina");
        assert!((response.confidence - 0.98).abs() < 1e-9);
        assert_eq!(response.risk_level, UrgencyLevel::High);
        assert_eq!(response.rules_matched, 4);
        assert!(!response.enhanced);
        assert!(response.diagnosis.starts_with(
            "Based on the reasoning analysis, patient symptoms suggest possible Angina."
        ));
        assert!(response.diagnosis.contains("The confidence level is high (98%)"));
        assert!(response
            .diagnosis
            .contains("Patient has 2 significant risk factors including hypertension, diabetes."));
        assert_eq!(
            response.reasoning_summary,
            "Analysis identified angina with 98% confidence. Risk factors: hypertension, diabetes. Evaluated 4 medical reasoning rules."
        );
        assert_eq!(response.session_id, "s-7");
    }

    #[tokio::test]
    async fn test_moderate_confidence_wording() {
        let agent = specialist(Specialty::Neurology, Arc::new(DisabledEnhancer));
        let response = agent.analyze(&request("nothing recognisable", None, &[])).await;
        assert!(response.diagnosis.contains("The confidence level is moderate (50%)."));
        assert!(!response.diagnosis.contains("significant risk factors"));
        assert!(response.rules_matched >= 1);
    }

    #[tokio::test]
    async fn test_enhanced_text_replaces_diagnosis() {
        let agent = specialist(
            Specialty::Dermatology,
            Arc::new(FixedEnhancer(Some("Your skin change should be checked soon.".into()))),
        );
        let response = agent
            .analyze(&request("a dark mole that is changing shape", None, &[]))
            .await;
        assert!(response.enhanced);
        assert_eq!(response.diagnosis, "Your skin change should be checked soon.");
        assert_eq!(response.condition, "melanoma");
    }

    #[tokio::test]
    async fn test_empty_enhancement_keeps_technical_text() {
        let agent = specialist(Specialty::Dermatology, Arc::new(FixedEnhancer(Some("  ".into()))));
        let response = agent
            .analyze(&request("a dark mole that is changing shape", None, &[]))
            .await;
        assert!(!response.enhanced);
        assert!(response.diagnosis.ends_with("URGENT DERMATOLOGY EVALUATION RECOMMENDED."));
    }

    #[tokio::test]
    async fn test_health_reports_enhancer_availability() {
        let agent = specialist(Specialty::Cardiology, Arc::new(FixedEnhancer(None)));
        let reply = agent
            .handle(AgentMessage::HealthCheck(pulse_core::protocol::HealthCheck {
                requester: "test".to_string(),
                timestamp: chrono::Utc::now(),
            }))
            .await;
        match reply {
            Some(AgentMessage::HealthResponse(health)) => {
                assert!(health.knowledge_loaded);
                assert!(health.enhancer_available);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
