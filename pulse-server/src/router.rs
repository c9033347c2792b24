use crate::agents::{self, AgentCallError, CoordinatorHandle};
use pulse_core::ipc::{PulseRequest, PulseResponse};
use pulse_core::models::Specialty;
use pulse_core::protocol::{
    AgentMessage, HealthStatus, PatientProfile, SpecialistAnalysisRequest, SymptomRoutingRequest,
};
use pulse_core::{MessageBus, PulseConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a request needs: configuration, the bus and the coordinator.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<PulseConfig>,
    pub bus: MessageBus,
    pub coordinator: CoordinatorHandle,
}

impl AppContext {
    pub fn new(config: Arc<PulseConfig>, bus: MessageBus, coordinator: CoordinatorHandle) -> Self {
        Self {
            config,
            bus,
            coordinator,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.sessions.poll_timeout_seconds)
    }
}

fn to_data<T: Serialize>(value: &T) -> PulseResponse {
    match serde_json::to_value(value) {
        Ok(data) => PulseResponse::ok(data),
        Err(e) => PulseResponse::err(format!("Serialization error: {}", e)),
    }
}

pub async fn handle_request(request: PulseRequest, ctx: &AppContext) -> PulseResponse {
    match request {
        PulseRequest::Ping => PulseResponse::pong(),
        PulseRequest::Health => handle_health(ctx).await,
        PulseRequest::Consult { message, patient } => {
            match ctx.coordinator.consult(&message, patient).await {
                Ok(outcome) => PulseResponse::ok(outcome.to_json()),
                Err(e) => PulseResponse::err(e.to_string()),
            }
        }
        PulseRequest::Chat {
            message,
            session_id,
            patient,
        } => handle_chat(ctx, &message, session_id, patient).await,
        PulseRequest::Route { symptoms, age } => handle_route(ctx, symptoms, age).await,
        PulseRequest::Analyze {
            specialty,
            symptoms,
            age,
            history,
        } => handle_analyze(ctx, &specialty, symptoms, age, history).await,
    }
}

async fn handle_health(ctx: &AppContext) -> PulseResponse {
    let coordinator = match ctx.coordinator.health().await {
        Ok(health) => health,
        Err(e) => return PulseResponse::err(format!("Coordinator health check failed: {}", e)),
    };
    let active_sessions = ctx.coordinator.session_count().await.unwrap_or(0);

    let agents_config = &ctx.config.agents;
    let mut targets: Vec<(&str, String)> = Vec::new();
    if let Some(address) = agents_config.triage_address() {
        targets.push(("triage", address.to_string()));
    }
    for specialty in Specialty::ALL {
        if let Some(address) = agents_config.specialist_address(specialty) {
            targets.push((specialty.as_str(), address.to_string()));
        }
    }

    let mut healthy = coordinator.status == HealthStatus::Healthy;
    let mut agents = Vec::new();
    for (role, address) in targets {
        match agents::probe_health(&ctx.bus, &address, HEALTH_PROBE_TIMEOUT).await {
            Ok(health) => agents.push(serde_json::json!({
                "role": role,
                "address": address,
                "status": health.status,
                "knowledge_loaded": health.knowledge_loaded,
                "enhancer_available": health.enhancer_available,
            })),
            Err(e) => {
                healthy = false;
                agents.push(serde_json::json!({
                    "role": role,
                    "address": address,
                    "status": "unreachable",
                    "error": e.to_string(),
                }));
            }
        }
    }

    PulseResponse::ok(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "coordinator": coordinator,
        "active_sessions": active_sessions,
        "agents": agents,
    }))
}

async fn handle_chat(
    ctx: &AppContext,
    message: &str,
    session_id: Option<String>,
    patient: Option<PatientProfile>,
) -> PulseResponse {
    let result = agents::converse(
        &ctx.bus,
        &ctx.config.agents.coordinator,
        message,
        session_id,
        patient,
        ctx.call_timeout(),
    )
    .await;
    match result {
        Ok(responses) => PulseResponse::ok(serde_json::json!({
            "final": responses.last(),
            "responses": responses,
        })),
        Err(e) => PulseResponse::err(e.to_string()),
    }
}

async fn handle_route(ctx: &AppContext, symptoms: String, age: Option<u32>) -> PulseResponse {
    let Some(address) = ctx.config.agents.triage_address() else {
        return PulseResponse::err("Triage agent not configured");
    };
    let request = AgentMessage::SymptomRoutingRequest(SymptomRoutingRequest {
        symptoms,
        patient_age: age,
        patient_gender: None,
        medical_history: Vec::new(),
        session_id: format!("ipc-{}", Uuid::new_v4()),
    });
    match agents::ask(&ctx.bus, address, request, ctx.call_timeout()).await {
        Ok(AgentMessage::SpecialtyRecommendation(rec)) => to_data(&rec),
        Ok(other) => PulseResponse::err(
            AgentCallError::UnexpectedReply {
                address: address.to_string(),
                kind: other.kind(),
            }
            .to_string(),
        ),
        Err(e) => PulseResponse::err(e.to_string()),
    }
}

async fn handle_analyze(
    ctx: &AppContext,
    specialty: &str,
    symptoms: String,
    age: Option<u32>,
    history: Vec<String>,
) -> PulseResponse {
    let specialty: Specialty = match specialty.parse() {
        Ok(s) => s,
        Err(e) => return PulseResponse::err(format!("{}", e)),
    };
    let Some(address) = ctx.config.agents.specialist_address(specialty) else {
        return PulseResponse::err(format!("{} agent not configured", specialty));
    };
    let request = AgentMessage::SpecialistAnalysisRequest(SpecialistAnalysisRequest {
        symptoms,
        patient_age: age,
        patient_gender: None,
        medical_history: history,
        session_id: format!("ipc-{}", Uuid::new_v4()),
    });
    match agents::ask(&ctx.bus, address, request, ctx.call_timeout()).await {
        Ok(AgentMessage::SpecialistAnalysisResponse(analysis)) => to_data(&analysis),
        Ok(other) => PulseResponse::err(
            AgentCallError::UnexpectedReply {
                address: address.to_string(),
                kind: other.kind(),
            }
            .to_string(),
        ),
        Err(e) => PulseResponse::err(e.to_string()),
    }
}
