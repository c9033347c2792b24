use async_trait::async_trait;
use pulse_core::models::UrgencyLevel;
use pulse_core::protocol::{AgentMessage, SpecialtyRecommendation, SymptomRoutingRequest};
use pulse_core::{routing_reasoning, TriageRouter};

use super::{health_response, Agent};

pub struct TriageAgent {
    name: String,
    router: TriageRouter,
}

impl TriageAgent {
    pub fn new(name: impl Into<String>, router: TriageRouter) -> Self {
        Self {
            name: name.into(),
            router,
        }
    }

    pub fn recommend(&self, request: &SymptomRoutingRequest) -> SpecialtyRecommendation {
        let resolved = self.router.route(&request.symptoms, request.patient_age);
        let fallback = resolved.is_fallback();
        if let Some(reason) = resolved.reason() {
            tracing::warn!(
                session_id = %request.session_id,
                specialty = %resolved.value().specialty,
                ?reason,
                "Routing used the unroutable default"
            );
        }
        let result = resolved.into_value();

        tracing::info!(
            session_id = %request.session_id,
            specialty = %result.specialty,
            confidence = result.confidence,
            urgency = result.urgency,
            "Symptoms routed"
        );

        SpecialtyRecommendation {
            recommended_specialty: result.specialty.as_str().to_string(),
            confidence: result.confidence,
            urgency_level: UrgencyLevel::from_score(result.urgency),
            urgency_score: result.urgency,
            reasoning: routing_reasoning(&result, fallback),
            matched_rules: result.matched_rule_count,
            matched_keywords: result.matched_keywords,
            secondary_specialty: result.secondary_specialty.map(|s| s.as_str().to_string()),
            per_specialty_scores: result
                .per_specialty_scores
                .into_iter()
                .map(|(specialty, score)| (specialty.as_str().to_string(), score))
                .collect(),
            routing_fallback: fallback,
            session_id: request.session_id.clone(),
        }
    }
}

#[async_trait]
impl Agent for TriageAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: AgentMessage) -> Option<AgentMessage> {
        match message {
            AgentMessage::SymptomRoutingRequest(request) => {
                Some(AgentMessage::SpecialtyRecommendation(self.recommend(&request)))
            }
            AgentMessage::HealthCheck(check) => {
                tracing::debug!(requester = %check.requester, "Health check");
                let loaded = self.router.knowledge().fact_count() > 0;
                Some(AgentMessage::HealthResponse(health_response(
                    &self.name, loaded, false,
                )))
            }
            other => {
                tracing::warn!(agent = %self.name, kind = other.kind(), "Unexpected message");
                None
            }
        }
    }
}
