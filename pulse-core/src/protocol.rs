//! Messages exchanged between agents over the [`crate::bus::MessageBus`].
//!
//! Every request has a matching response type; all of them travel inside an
//! [`Envelope`] that records sender and recipient addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::UrgencyLevel;

fn default_session_id() -> String {
    "default".to_string()
}

/// Optional patient context attached to a consultation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub history: Vec<String>,
}

// ============================================================================
// User-facing chat
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub patient: Option<PatientProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatResponse {
    pub fn new(response: impl Into<String>, session_id: impl Into<String>, kind: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".to_string(), Value::String(kind.to_string()));
        Self {
            response: response.into(),
            session_id: session_id.into(),
            metadata,
        }
    }

    /// Value of the `type` metadata entry, e.g. `processing`, `result`, `error`.
    pub fn kind(&self) -> Option<&str> {
        self.metadata.get("type").and_then(Value::as_str)
    }

    /// Interim messages (greetings excluded) that precede the final answer.
    pub fn is_interim(&self) -> bool {
        self.kind() == Some("processing")
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind(), Some("error") | Some("timeout"))
    }
}

/// Chat envelope used by external bridge clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeChatMessage {
    pub timestamp: DateTime<Utc>,
    pub msg_id: Uuid,
    pub content: Vec<BridgeContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeContent {
    Text { text: String },
}

impl BridgeChatMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            msg_id: Uuid::new_v4(),
            content: vec![BridgeContent::Text { text: text.into() }],
        }
    }

    /// All text parts joined with a single space.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                BridgeContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAcknowledgement {
    pub timestamp: DateTime<Utc>,
    pub acknowledged_msg_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebQuery {
    pub message: String,
    #[serde(default)]
    pub patient: Option<PatientProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebQueryResponse {
    pub response: String,
    pub success: bool,
}

// ============================================================================
// Triage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomRoutingRequest {
    pub symptoms: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyRecommendation {
    pub recommended_specialty: String,
    pub confidence: f64,
    pub urgency_level: UrgencyLevel,
    pub urgency_score: f64,
    pub reasoning: String,
    pub matched_rules: u32,
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub secondary_specialty: Option<String>,
    #[serde(default)]
    pub per_specialty_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub routing_fallback: bool,
    pub session_id: String,
}

// ============================================================================
// Specialist
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistAnalysisRequest {
    pub symptoms: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistAnalysisResponse {
    pub specialty: String,
    pub diagnosis: String,
    pub condition: String,
    pub confidence: f64,
    pub urgency_score: f64,
    pub risk_level: UrgencyLevel,
    pub recommendations: Vec<String>,
    pub rules_matched: u32,
    pub risk_factors: Vec<String>,
    pub enhanced: bool,
    pub reasoning_summary: String,
    pub session_id: String,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub requester: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub agent_name: String,
    pub status: HealthStatus,
    pub knowledge_loaded: bool,
    pub enhancer_available: bool,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    ChatMessage(ChatMessage),
    ChatResponse(ChatResponse),
    BridgeChatMessage(BridgeChatMessage),
    ChatAcknowledgement(ChatAcknowledgement),
    WebQuery(WebQuery),
    WebQueryResponse(WebQueryResponse),
    SymptomRoutingRequest(SymptomRoutingRequest),
    SpecialtyRecommendation(SpecialtyRecommendation),
    SpecialistAnalysisRequest(SpecialistAnalysisRequest),
    SpecialistAnalysisResponse(SpecialistAnalysisResponse),
    HealthCheck(HealthCheck),
    HealthResponse(HealthResponse),
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::ChatMessage(_) => "chat_message",
            AgentMessage::ChatResponse(_) => "chat_response",
            AgentMessage::BridgeChatMessage(_) => "bridge_chat_message",
            AgentMessage::ChatAcknowledgement(_) => "chat_acknowledgement",
            AgentMessage::WebQuery(_) => "web_query",
            AgentMessage::WebQueryResponse(_) => "web_query_response",
            AgentMessage::SymptomRoutingRequest(_) => "symptom_routing_request",
            AgentMessage::SpecialtyRecommendation(_) => "specialty_recommendation",
            AgentMessage::SpecialistAnalysisRequest(_) => "specialist_analysis_request",
            AgentMessage::SpecialistAnalysisResponse(_) => "specialist_analysis_response",
            AgentMessage::HealthCheck(_) => "health_check",
            AgentMessage::HealthResponse(_) => "health_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
    pub message: AgentMessage,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, message: AgentMessage) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            message,
        }
    }
}
