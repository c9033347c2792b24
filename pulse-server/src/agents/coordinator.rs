//! User-facing coordinator.
//!
//! Owns the session table. Every mutation happens inside [`Coordinator::run`],
//! either in response to a bus envelope or to a [`CoordinatorHandle`]
//! command, so no locking is needed. Work that has to wait (doctor lookups,
//! poll-mode consultations) runs in spawned tasks that report back through
//! the command channel.
//!
//! Delivery modes:
//! - push: `ChatMessage` in, `ChatResponse`s back to the sender
//! - bridge: `BridgeChatMessage` in, acknowledgement then `BridgeChatMessage` back
//! - poll: [`CoordinatorHandle::consult`] (also used for `WebQuery`)

use chrono::{DateTime, Utc};
use pulse_core::config::{AgentsConfig, DoctorEntry, PulseConfig, SessionConfig};
use pulse_core::models::{
    DeliveryMode, Session, SessionError, SessionFailure, SessionState, Specialty,
};
use pulse_core::protocol::{
    AgentMessage, BridgeChatMessage, ChatAcknowledgement, ChatMessage, ChatResponse, Envelope,
    HealthResponse, HealthStatus, PatientProfile, SpecialistAnalysisRequest,
    SpecialistAnalysisResponse, SpecialtyRecommendation, SymptomRoutingRequest, WebQuery,
    WebQueryResponse,
};
use pulse_core::{DoctorDirectory, Mailbox, MessageBus};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

pub const WELCOME_MESSAGE: &str = "Welcome to PulseBridge - AI-Powered Healthcare Consultation

I'm your health assistant, backed by:
- Rule-based medical reasoning for cardiology, neurology and dermatology
- Triage and specialist agents working together
- Doctor directory matching

How it works:
1. Describe your symptoms in natural language
2. Our triage agent routes to the right specialist
3. Specialist agent provides detailed analysis
4. Get matched with available doctors

Example: \"I have severe chest pain when I exercise and shortness of breath\"

Please describe your symptoms to begin your consultation.";

pub const PROCESSING_MESSAGE: &str =
    "Analyzing your symptoms... Please wait while I consult our medical specialists.";

const DISCLAIMER: &str = "**Important:** This is an AI assessment tool. Always consult with a qualified healthcare professional for proper diagnosis and treatment.";

static GREETING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|greetings|start|help)\b[\s!.,]*$").ok()
});

/// True when the whole message is a single greeting word.
pub fn is_greeting(message: &str) -> bool {
    GREETING
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

// ============================================================================
// Handle
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("coordinator is not running")]
    Stopped,
}

/// Result of a poll-mode consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsultOutcome {
    Greeting(String),
    Completed(ChatResponse),
    Failed(ChatResponse),
    TimedOut(String),
}

impl ConsultOutcome {
    pub fn text(&self) -> &str {
        match self {
            ConsultOutcome::Greeting(text) | ConsultOutcome::TimedOut(text) => text,
            ConsultOutcome::Completed(response) | ConsultOutcome::Failed(response) => {
                &response.response
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConsultOutcome::Greeting(_) | ConsultOutcome::Completed(_))
    }

    pub fn to_json(&self) -> Value {
        let (kind, metadata, session_id) = match self {
            ConsultOutcome::Greeting(_) => ("greeting", Value::Null, None),
            ConsultOutcome::TimedOut(_) => ("timeout", Value::Null, None),
            ConsultOutcome::Completed(r) | ConsultOutcome::Failed(r) => (
                r.kind().unwrap_or("result"),
                Value::Object(r.metadata.clone()),
                Some(r.session_id.clone()),
            ),
        };
        json!({
            "success": self.is_success(),
            "type": kind,
            "response": self.text(),
            "session_id": session_id,
            "metadata": metadata,
        })
    }
}

enum Opened {
    Immediate(ConsultOutcome),
    Started(String),
}

enum PollState {
    Pending,
    Ready(ChatResponse),
    Gone,
}

enum Command {
    Open {
        message: String,
        patient: Option<PatientProfile>,
        reply: oneshot::Sender<Opened>,
    },
    TakeIfReady {
        session_id: String,
        reply: oneshot::Sender<PollState>,
    },
    Abandon {
        session_id: String,
    },
    DoctorsResolved {
        session_id: String,
        doctors: Vec<DoctorEntry>,
    },
    Sweep {
        now: DateTime<Utc>,
        reply: oneshot::Sender<usize>,
    },
    SessionCount {
        reply: oneshot::Sender<usize>,
    },
    Health {
        reply: oneshot::Sender<HealthResponse>,
    },
}

/// Cloneable entry point into the coordinator loop.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Run a full consultation in poll mode: open a session, then check for
    /// the final response every poll interval until the poll timeout.
    pub async fn consult(
        &self,
        message: &str,
        patient: Option<PatientProfile>,
    ) -> Result<ConsultOutcome, CoordinatorError> {
        let opened = self
            .request(|reply| Command::Open {
                message: message.to_string(),
                patient,
                reply,
            })
            .await?;
        let session_id = match opened {
            Opened::Immediate(outcome) => return Ok(outcome),
            Opened::Started(id) => id,
        };

        let deadline = Instant::now() + self.poll_timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let state = self
                .request(|reply| Command::TakeIfReady {
                    session_id: session_id.clone(),
                    reply,
                })
                .await?;
            match state {
                PollState::Ready(response) if response.is_error() => {
                    return Ok(ConsultOutcome::Failed(response))
                }
                PollState::Ready(response) => return Ok(ConsultOutcome::Completed(response)),
                PollState::Gone => break,
                PollState::Pending if Instant::now() >= deadline => break,
                PollState::Pending => {}
            }
        }

        tracing::warn!(
            session_id = %session_id,
            timeout_secs = self.poll_timeout.as_secs(),
            "Consultation timed out"
        );
        self.commands
            .send(Command::Abandon { session_id })
            .await
            .map_err(|_| CoordinatorError::Stopped)?;
        Ok(ConsultOutcome::TimedOut(SessionFailure::Timeout.user_message()))
    }

    pub async fn session_count(&self) -> Result<usize, CoordinatorError> {
        self.request(|reply| Command::SessionCount { reply }).await
    }

    /// Reap sessions older than the TTL as of `now`. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, CoordinatorError> {
        self.request(|reply| Command::Sweep { now, reply }).await
    }

    pub async fn health(&self) -> Result<HealthResponse, CoordinatorError> {
        self.request(|reply| Command::Health { reply }).await
    }

    async fn doctors_resolved(&self, session_id: String, doctors: Vec<DoctorEntry>) {
        if self
            .commands
            .send(Command::DoctorsResolved {
                session_id,
                doctors,
            })
            .await
            .is_err()
        {
            tracing::debug!("Coordinator stopped before doctor lookup finished");
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct Coordinator {
    core: Core,
    commands: mpsc::Receiver<Command>,
}

struct Core {
    address: String,
    bus: MessageBus,
    agents: AgentsConfig,
    limits: SessionConfig,
    max_doctors: usize,
    directory: Arc<dyn DoctorDirectory>,
    sessions: HashMap<String, Session>,
    loopback: CoordinatorHandle,
}

impl Coordinator {
    pub fn new(
        config: &PulseConfig,
        bus: MessageBus,
        directory: Arc<dyn DoctorDirectory>,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(config.agents.mailbox_capacity.max(1));
        let handle = CoordinatorHandle {
            commands: tx,
            poll_timeout: Duration::from_secs(config.sessions.poll_timeout_seconds),
            poll_interval: Duration::from_millis(config.sessions.poll_interval_ms.max(1)),
        };
        let core = Core {
            address: config.agents.coordinator.clone(),
            bus,
            agents: config.agents.clone(),
            limits: config.sessions.clone(),
            max_doctors: config.doctors.max_results,
            directory,
            sessions: HashMap::new(),
            loopback: handle.clone(),
        };
        (
            Self {
                core,
                commands: rx,
            },
            handle,
        )
    }

    pub async fn run(self, mut mailbox: Mailbox, mut shutdown: broadcast::Receiver<()>) {
        let Coordinator {
            mut core,
            mut commands,
        } = self;

        tracing::info!(
            address = %core.address,
            triage = core.agents.triage_address().unwrap_or("NOT CONFIGURED"),
            cardiology = core.agents.specialist_address(Specialty::Cardiology).unwrap_or("NOT CONFIGURED"),
            neurology = core.agents.specialist_address(Specialty::Neurology).unwrap_or("NOT CONFIGURED"),
            dermatology = core.agents.specialist_address(Specialty::Dermatology).unwrap_or("NOT CONFIGURED"),
            "Coordinator started"
        );

        loop {
            tokio::select! {
                envelope = mailbox.recv() => {
                    let Some(envelope) = envelope else { break };
                    core.on_envelope(envelope).await;
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    core.on_command(command).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(active_sessions = core.sessions.len(), "Shutting down coordinator...");
                    break;
                }
            }
        }

        core.bus.deregister(mailbox.address()).await;
    }
}

fn error_response(session_id: &str, text: String, detail: &str) -> ChatResponse {
    let mut response = ChatResponse::new(text, session_id, "error");
    response
        .metadata
        .insert("error".to_string(), Value::String(detail.to_string()));
    response
}

fn failure_response(session_id: &str, failure: &SessionFailure) -> ChatResponse {
    match failure {
        SessionFailure::Timeout => {
            let mut response = ChatResponse::new(failure.user_message(), session_id, "timeout");
            response
                .metadata
                .insert("error".to_string(), Value::String(failure.detail().to_string()));
            response
        }
        _ => error_response(session_id, failure.user_message(), failure.detail()),
    }
}

fn advance(session: &mut Session, next: SessionState) {
    if let Err(e) = session.advance(next) {
        tracing::error!(error = %e, "Session transition rejected");
    }
}

impl Core {
    async fn on_envelope(&mut self, envelope: Envelope) {
        let sender = envelope.sender;
        match envelope.message {
            AgentMessage::ChatMessage(msg) => self.on_chat(&sender, msg).await,
            AgentMessage::BridgeChatMessage(msg) => self.on_bridge(&sender, msg).await,
            AgentMessage::WebQuery(query) => self.on_web_query(&sender, query).await,
            AgentMessage::SpecialtyRecommendation(rec) => self.on_recommendation(rec).await,
            AgentMessage::SpecialistAnalysisResponse(resp) => self.on_specialist(resp).await,
            AgentMessage::ChatAcknowledgement(ack) => {
                tracing::info!(
                    sender = %sender,
                    msg_id = %ack.acknowledged_msg_id,
                    "Chat acknowledgement received"
                );
            }
            AgentMessage::HealthCheck(_) => {
                let health = self.health();
                self.send(&sender, AgentMessage::HealthResponse(health)).await;
            }
            other => {
                tracing::warn!(sender = %sender, kind = other.kind(), "Unexpected message");
            }
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Open {
                message,
                patient,
                reply,
            } => {
                let opened = self.open_poll(message, patient).await;
                let _ = reply.send(opened);
            }
            Command::TakeIfReady { session_id, reply } => {
                let state = match self.sessions.get(&session_id) {
                    None => PollState::Gone,
                    Some(session) if !session.is_ready() => PollState::Pending,
                    Some(_) => self
                        .sessions
                        .remove(&session_id)
                        .and_then(|session| session.final_response)
                        .map_or(PollState::Gone, PollState::Ready),
                };
                let _ = reply.send(state);
            }
            Command::Abandon { session_id } => {
                if let Some(mut session) = self.sessions.remove(&session_id) {
                    if !session.state().is_terminal() {
                        advance(&mut session, SessionFailure::Timeout.terminal_state());
                    }
                    tracing::info!(
                        session_id = %session_id,
                        state = %session.state(),
                        "Poll session abandoned"
                    );
                }
            }
            Command::DoctorsResolved {
                session_id,
                doctors,
            } => self.on_doctors(session_id, doctors).await,
            Command::Sweep { now, reply } => {
                let reaped = self.sweep(now).await;
                let _ = reply.send(reaped);
            }
            Command::SessionCount { reply } => {
                let _ = reply.send(self.sessions.len());
            }
            Command::Health { reply } => {
                let _ = reply.send(self.health());
            }
        }
    }

    async fn send(&self, to: &str, message: AgentMessage) {
        if let Err(e) = self.bus.deliver(&self.address, to, message).await {
            tracing::warn!(recipient = %to, error = %e, "Message could not be delivered");
        }
    }

    /// The coordinator owns no tables of its own; its knowledge is the
    /// triage agent's routing table, so it counts as loaded when triage is wired.
    fn health(&self) -> HealthResponse {
        let knowledge_loaded = self.agents.triage_address().is_some();
        HealthResponse {
            agent_name: self.address.clone(),
            status: if knowledge_loaded {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            knowledge_loaded,
            enhancer_available: false,
            timestamp: Utc::now(),
        }
    }

    /// Rejection text for input that should not start a session.
    fn validate(&self, message: &str) -> Option<String> {
        let length = message.chars().count();
        if message.trim().is_empty() {
            Some("Please describe your symptoms to begin your consultation.".to_string())
        } else if length > self.limits.max_message_chars {
            Some(format!(
                "Your message is too long ({} characters). Please keep it under {} characters.",
                length, self.limits.max_message_chars
            ))
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Session start
    // ------------------------------------------------------------------

    /// Create the session and send the routing request. On failure the
    /// session never enters the table.
    async fn start(
        &mut self,
        session_id: &str,
        owner: &str,
        symptoms: &str,
        patient: Option<PatientProfile>,
        mode: DeliveryMode,
    ) -> Result<(), SessionFailure> {
        let patient = patient.unwrap_or_default();
        let mut session = Session::new(session_id, owner, symptoms, patient, mode, Utc::now());

        let Some(triage) = self.agents.triage_address() else {
            advance(&mut session, SessionState::Error);
            tracing::error!(session_id = %session_id, "Triage agent not configured");
            return Err(SessionFailure::ConfigurationMissing(
                "Triage agent not configured".to_string(),
            ));
        };

        let request = SymptomRoutingRequest {
            symptoms: symptoms.to_string(),
            patient_age: session.patient.age,
            patient_gender: session.patient.gender.clone(),
            medical_history: session.patient.history.clone(),
            session_id: session_id.to_string(),
        };
        if let Err(e) = self
            .bus
            .deliver(&self.address, triage, AgentMessage::SymptomRoutingRequest(request))
            .await
        {
            advance(&mut session, SessionState::Error);
            tracing::error!(session_id = %session_id, error = %e, "Triage agent unreachable");
            return Err(SessionFailure::CollaboratorUnavailable(
                "Triage agent not available".to_string(),
            ));
        }

        advance(&mut session, SessionState::RoutingSent);
        tracing::info!(session_id = %session_id, mode = ?mode, "Consultation started");
        self.sessions.insert(session_id.to_string(), session);
        Ok(())
    }

    async fn on_chat(&mut self, sender: &str, msg: ChatMessage) {
        let session_id = msg.session_id;
        let reply = |response: ChatResponse| AgentMessage::ChatResponse(response);

        if is_greeting(&msg.message) {
            let welcome = ChatResponse::new(WELCOME_MESSAGE, session_id.as_str(), "greeting");
            self.send(sender, reply(welcome)).await;
            return;
        }
        if let Some(text) = self.validate(&msg.message) {
            self.send(sender, reply(error_response(&session_id, text, "invalid message")))
                .await;
            return;
        }
        if self.sessions.contains_key(&session_id) {
            tracing::warn!(session_id = %session_id, "Duplicate session id rejected");
            let text = SessionError::Duplicate(session_id.clone()).to_string();
            self.send(sender, reply(error_response(&session_id, text, "duplicate session")))
                .await;
            return;
        }

        match self
            .start(&session_id, sender, &msg.message, msg.patient, DeliveryMode::Push)
            .await
        {
            Ok(()) => {
                let processing = ChatResponse::new(PROCESSING_MESSAGE, session_id.as_str(), "processing");
                self.send(sender, reply(processing)).await;
            }
            Err(failure) => {
                let response = failure_response(&session_id, &failure);
                self.send(sender, reply(response)).await;
            }
        }
    }

    async fn on_bridge(&mut self, sender: &str, msg: BridgeChatMessage) {
        tracing::info!(sender = %sender, msg_id = %msg.msg_id, "Bridge chat message received");
        let ack = ChatAcknowledgement {
            timestamp: Utc::now(),
            acknowledged_msg_id: msg.msg_id,
        };
        self.send(sender, AgentMessage::ChatAcknowledgement(ack)).await;

        let text = msg.joined_text();
        let immediate = if text.trim().is_empty() {
            Some("No text content received in message".to_string())
        } else if is_greeting(&text) {
            Some(WELCOME_MESSAGE.to_string())
        } else {
            self.validate(&text)
        };
        if let Some(text) = immediate {
            self.send(sender, AgentMessage::BridgeChatMessage(BridgeChatMessage::text(text)))
                .await;
            return;
        }

        let session_id = format!("bridge-{}", Uuid::new_v4());
        if let Err(failure) = self
            .start(&session_id, sender, &text, None, DeliveryMode::Bridge)
            .await
        {
            let notice = BridgeChatMessage::text(failure.user_message());
            self.send(sender, AgentMessage::BridgeChatMessage(notice)).await;
        }
    }

    async fn open_poll(&mut self, message: String, patient: Option<PatientProfile>) -> Opened {
        if is_greeting(&message) {
            return Opened::Immediate(ConsultOutcome::Greeting(WELCOME_MESSAGE.to_string()));
        }
        let session_id = format!("web-{}", Uuid::new_v4());
        if let Some(text) = self.validate(&message) {
            return Opened::Immediate(ConsultOutcome::Failed(error_response(
                &session_id,
                text,
                "invalid message",
            )));
        }
        match self
            .start(&session_id, "poll", &message, patient, DeliveryMode::Poll)
            .await
        {
            Ok(()) => Opened::Started(session_id),
            Err(failure) => Opened::Immediate(ConsultOutcome::Failed(failure_response(
                &session_id,
                &failure,
            ))),
        }
    }

    /// Poll-mode consultation on behalf of a bus client, answered with a
    /// single `WebQueryResponse`.
    async fn on_web_query(&mut self, sender: &str, query: WebQuery) {
        tracing::info!(sender = %sender, "Web query received");
        let handle = self.loopback.clone();
        let bus = self.bus.clone();
        let from = self.address.clone();
        let to = sender.to_string();
        tokio::spawn(async move {
            let reply = match handle.consult(&query.message, query.patient).await {
                Ok(outcome) => WebQueryResponse {
                    response: outcome.text().to_string(),
                    success: outcome.is_success(),
                },
                Err(e) => WebQueryResponse {
                    response: e.to_string(),
                    success: false,
                },
            };
            if let Err(e) = bus
                .deliver(&from, &to, AgentMessage::WebQueryResponse(reply))
                .await
            {
                tracing::warn!(recipient = %to, error = %e, "Web query response not delivered");
            }
        });
    }

    // ------------------------------------------------------------------
    // Collaborator replies
    // ------------------------------------------------------------------

    /// Address for `requested`, falling back to the default specialist.
    /// The flag is true when a substitute was chosen.
    fn specialist_for(&self, requested: &str) -> Option<(Specialty, String, bool)> {
        match requested.parse::<Specialty>() {
            Ok(specialty) => {
                if let Some(address) = self.agents.specialist_address(specialty) {
                    return Some((specialty, address.to_string(), false));
                }
            }
            Err(e) => tracing::warn!(error = %e, "Recommended specialty not recognised"),
        }
        let fallback = self.agents.default_specialist;
        self.agents
            .specialist_address(fallback)
            .map(|address| (fallback, address.to_string(), true))
    }

    async fn on_recommendation(&mut self, rec: SpecialtyRecommendation) {
        let session_id = rec.session_id.clone();
        let Some(mut session) = self.sessions.remove(&session_id) else {
            tracing::warn!(session_id = %session_id, "Triage response for unknown session dropped");
            return;
        };
        if session.state() != SessionState::RoutingSent {
            tracing::warn!(
                session_id = %session_id,
                state = %session.state(),
                "Unexpected triage response ignored"
            );
            self.sessions.insert(session_id, session);
            return;
        }

        tracing::info!(
            session_id = %session_id,
            specialty = %rec.recommended_specialty,
            confidence = rec.confidence,
            "Triage recommendation received"
        );

        let requested = rec.recommended_specialty.clone();
        let request = SpecialistAnalysisRequest {
            symptoms: session.raw_symptoms.clone(),
            patient_age: session.patient.age,
            patient_gender: session.patient.gender.clone(),
            medical_history: session.patient.history.clone(),
            session_id: session_id.clone(),
        };
        session.triage = Some(rec);

        let mut target = self.specialist_for(&requested);
        let mut delivered = false;
        while let Some((specialty, address, substituted)) = target.take() {
            if substituted {
                tracing::warn!(
                    session_id = %session_id,
                    requested = %requested,
                    substitute = %specialty,
                    "Specialist unavailable, substituting default specialist"
                );
            }
            let message = AgentMessage::SpecialistAnalysisRequest(request.clone());
            match self.bus.deliver(&self.address, &address, message).await {
                Ok(()) => {
                    session.specialist_substituted = substituted;
                    delivered = true;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, address = %address, error = %e, "Specialist unreachable");
                    let fallback = self.agents.default_specialist;
                    if !substituted && fallback != specialty {
                        target = self
                            .agents
                            .specialist_address(fallback)
                            .map(|a| (fallback, a.to_string(), true));
                    }
                }
            }
        }

        if delivered {
            advance(&mut session, SessionState::SpecialistSent);
            self.sessions.insert(session_id, session);
        } else {
            let failure =
                SessionFailure::CollaboratorUnavailable(format!("{} agent not available", requested));
            self.fail(session, failure).await;
        }
    }

    async fn on_specialist(&mut self, response: SpecialistAnalysisResponse) {
        let session_id = response.session_id.clone();
        let Some(mut session) = self.sessions.remove(&session_id) else {
            tracing::warn!(session_id = %session_id, "Specialist response for unknown session dropped");
            return;
        };
        if session.state() != SessionState::SpecialistSent {
            tracing::warn!(
                session_id = %session_id,
                state = %session.state(),
                "Unexpected specialist response ignored"
            );
            self.sessions.insert(session_id, session);
            return;
        }

        tracing::info!(
            session_id = %session_id,
            condition = %response.condition,
            confidence = response.confidence,
            "Specialist analysis received"
        );

        let specialty = response.specialty.clone();
        session.specialist = Some(response);
        advance(&mut session, SessionState::DoctorsQueried);
        self.sessions.insert(session_id.clone(), session);

        let directory = Arc::clone(&self.directory);
        let loopback = self.loopback.clone();
        let max_results = self.max_doctors;
        tokio::spawn(async move {
            let doctors = match directory.find_doctors(&specialty, max_results).await {
                Ok(doctors) => doctors,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        directory = directory.name(),
                        error = %e,
                        "Doctor lookup failed, continuing without doctors"
                    );
                    Vec::new()
                }
            };
            loopback.doctors_resolved(session_id, doctors).await;
        });
    }

    async fn on_doctors(&mut self, session_id: String, doctors: Vec<DoctorEntry>) {
        let Some(mut session) = self.sessions.remove(&session_id) else {
            tracing::debug!(session_id = %session_id, "Session gone before doctor lookup finished");
            return;
        };
        let response = match (&session.triage, &session.specialist) {
            (Some(triage), Some(specialist)) => Some(final_response(
                &session_id,
                triage,
                specialist,
                &doctors,
                session.specialist_substituted,
            )),
            _ => None,
        };
        let Some(response) = response else {
            let failure = SessionFailure::CollaboratorUnavailable("incomplete analysis".to_string());
            self.fail(session, failure).await;
            return;
        };
        advance(&mut session, SessionState::Complete);
        tracing::info!(
            session_id = %session_id,
            doctors_found = doctors.len(),
            "Consultation complete"
        );
        self.finish(session, response).await;
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    async fn fail(&mut self, mut session: Session, failure: SessionFailure) {
        tracing::error!(
            session_id = %session.id,
            error = %failure.detail(),
            "Consultation failed"
        );
        advance(&mut session, failure.terminal_state());
        let response = failure_response(&session.id, &failure);
        self.finish(session, response).await;
    }

    /// Hand the final response over according to the session's delivery
    /// mode. Poll sessions stay in the table until collected or reaped.
    async fn finish(&mut self, mut session: Session, response: ChatResponse) {
        match session.mode {
            DeliveryMode::Push => {
                self.send(&session.owner, AgentMessage::ChatResponse(response))
                    .await;
            }
            DeliveryMode::Bridge => {
                let message = BridgeChatMessage::text(response.response);
                self.send(&session.owner, AgentMessage::BridgeChatMessage(message))
                    .await;
            }
            DeliveryMode::Poll => {
                session.final_response = Some(response);
                self.sessions.insert(session.id.clone(), session);
            }
        }
    }

    async fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let ttl_seconds = i64::try_from(self.limits.ttl_seconds).unwrap_or(i64::from(u32::MAX));
        let ttl = chrono::Duration::seconds(ttl_seconds);
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now, ttl))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            let Some(mut session) = self.sessions.remove(id) else {
                continue;
            };
            let state = session.state();
            tracing::info!(session_id = %id, state = %state, "Reaped expired session");
            if state.is_terminal() {
                continue;
            }
            let failure = SessionFailure::Timeout;
            advance(&mut session, failure.terminal_state());
            let notice = failure_response(id, &failure);
            match session.mode {
                DeliveryMode::Push => {
                    self.send(&session.owner, AgentMessage::ChatResponse(notice))
                        .await;
                }
                DeliveryMode::Bridge => {
                    let notice = BridgeChatMessage::text(notice.response);
                    self.send(&session.owner, AgentMessage::BridgeChatMessage(notice))
                        .await;
                }
                DeliveryMode::Poll => {}
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Cleaned up stale sessions");
        }
        expired.len()
    }
}

// ============================================================================
// Response formatting
// ============================================================================

fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Final consultation text plus result metadata.
pub fn final_response(
    session_id: &str,
    triage: &SpecialtyRecommendation,
    specialist: &SpecialistAnalysisResponse,
    doctors: &[DoctorEntry],
    specialist_substituted: bool,
) -> ChatResponse {
    let specialty_title = specialist
        .specialty
        .parse::<Specialty>()
        .map(|s| s.title().to_string())
        .unwrap_or_else(|_| specialist.specialty.clone());
    let rules_total = triage.matched_rules + specialist.rules_matched;

    let mut text = String::from("**PulseBridge AI Medical Consultation**\n\n");
    text.push_str(&format!("**Analysis:**\n{}\n\n", specialist.diagnosis));
    text.push_str(&format!("**Recommended Specialist:** {}\n", specialty_title));
    text.push_str(&format!(
        "**Diagnostic Confidence:** {}\n\n",
        percent(specialist.confidence)
    ));
    text.push_str(&format!(
        "**Urgency Level:** {}\n\n",
        specialist.risk_level.title()
    ));

    if !specialist.recommendations.is_empty() {
        text.push_str("**Recommendations:**\n");
        for (i, rec) in specialist.recommendations.iter().take(3).enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, rec));
        }
        text.push('\n');
    }

    if doctors.is_empty() {
        text.push_str("**Note:** Doctor matching temporarily unavailable\n\n");
    } else {
        text.push_str(&format!(
            "**Available Specialists ({} found):**\n",
            doctors.len()
        ));
        for (i, doctor) in doctors.iter().take(3).enumerate() {
            text.push_str(&format!(
                "{}. Dr. {} - {}\n",
                i + 1,
                doctor.name,
                doctor.specialization
            ));
            if let Some(email) = &doctor.email {
                text.push_str(&format!("   Email: {}\n", email));
            }
        }
        text.push('\n');
    }

    text.push_str("**AI Reasoning Transparency:**\n");
    text.push_str(&format!("- {} reasoning rules evaluated\n", rules_total));
    text.push_str(&format!(
        "- Triage routing confidence: {}\n",
        percent(triage.confidence)
    ));
    if triage.routing_fallback {
        text.push_str("- No routing rule matched; the default specialty was used\n");
    }
    if specialist_substituted {
        text.push_str(&format!(
            "- Triage recommended {}; analysed by the {} specialist instead\n",
            triage.recommended_specialty, specialty_title
        ));
    }
    if specialist.enhanced {
        text.push_str("- Enhanced with natural language processing\n");
    }
    text.push('\n');
    text.push_str(DISCLAIMER);

    let mut response = ChatResponse::new(text, session_id, "result");
    let metadata = &mut response.metadata;
    metadata.insert("specialty".into(), json!(specialist.specialty));
    metadata.insert("condition".into(), json!(specialist.condition));
    metadata.insert("urgency".into(), json!(specialist.risk_level.as_str()));
    metadata.insert("doctors_found".into(), json!(doctors.len()));
    metadata.insert("rules_total".into(), json!(rules_total));
    metadata.insert("enhanced".into(), json!(specialist.enhanced));
    metadata.insert("routing_fallback".into(), json!(triage.routing_fallback));
    metadata.insert(
        "specialist_substituted".into(),
        json!(specialist_substituted),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::spawn_agents;
    use pulse_core::doctors::StaticDirectory;
    use pulse_core::enhancer::DisabledEnhancer;
    use pulse_core::models::{UrgencyLevel, TIMEOUT_MESSAGE};
    use pulse_core::KnowledgeRegistry;

    const EXAMPLE: &str = "I have severe chest pain when I exercise and shortness of breath";

    fn config(agents: &str, extra: &str) -> PulseConfig {
        let toml = format!(
            "[service]\nsocket_path = \"/tmp/pulse-test.sock\"\nlog_level = \"info\"\n\n[agents]\ncoordinator = \"coordinator\"\ndefault_specialist = \"cardiology\"\n{}\n\n[sessions]\npoll_timeout_seconds = 5\npoll_interval_ms = 20\nmax_message_chars = 200\n{}",
            agents, extra
        );
        PulseConfig::from_toml_str(&toml).unwrap()
    }

    fn full_agents() -> &'static str {
        "triage = \"triage\"\ncardiology = \"cardiology\"\nneurology = \"neurology\"\ndermatology = \"dermatology\""
    }

    fn directory() -> Arc<dyn DoctorDirectory> {
        Arc::new(StaticDirectory::new(vec![DoctorEntry {
            name: "Ada Heart".to_string(),
            specialization: "Cardiologist".to_string(),
            email: Some("ada@clinic.test".to_string()),
        }]))
    }

    struct System {
        bus: MessageBus,
        handle: CoordinatorHandle,
        _shutdown: broadcast::Sender<()>,
    }

    async fn system(config: PulseConfig) -> System {
        let bus = MessageBus::new();
        let (tx, _) = broadcast::channel(1);
        let handle = spawn_agents(
            &config,
            &bus,
            &KnowledgeRegistry::load(),
            Arc::new(DisabledEnhancer),
            directory(),
            &tx,
        )
        .await
        .unwrap();
        System {
            bus,
            handle,
            _shutdown: tx,
        }
    }

    /// Coordinator wired to a triage mailbox that never answers.
    async fn stalled_system(config: PulseConfig) -> (System, Mailbox) {
        let bus = MessageBus::new();
        let (tx, _) = broadcast::channel(1);
        let triage = bus.register("triage", 16).await.unwrap();
        let (coordinator, handle) = Coordinator::new(&config, bus.clone(), directory());
        let mailbox = bus.register("coordinator", 16).await.unwrap();
        tokio::spawn(coordinator.run(mailbox, tx.subscribe()));
        (
            System {
                bus,
                handle,
                _shutdown: tx,
            },
            triage,
        )
    }

    async fn next_chat(user: &mut Mailbox) -> ChatResponse {
        loop {
            let envelope = tokio::time::timeout(Duration::from_secs(5), user.recv())
                .await
                .expect("timed out waiting for coordinator")
                .expect("mailbox closed");
            if let AgentMessage::ChatResponse(response) = envelope.message {
                return response;
            }
        }
    }

    async fn chat(bus: &MessageBus, session_id: &str, message: &str) {
        bus.deliver(
            "user",
            "coordinator",
            AgentMessage::ChatMessage(ChatMessage {
                message: message.to_string(),
                session_id: session_id.to_string(),
                patient: None,
            }),
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_greeting_detection() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("  Hello!  "));
        assert!(is_greeting("HELP."));
        assert!(!is_greeting("hi, my chest hurts"));
        assert!(!is_greeting("this is not a greeting"));
        assert!(!is_greeting(""));
    }

    #[tokio::test]
    async fn test_push_greeting_creates_no_session() {
        let sys = system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("user", 16).await.unwrap();

        chat(&sys.bus, "s-1", "hello").await;
        let response = next_chat(&mut user).await;
        assert_eq!(response.kind(), Some("greeting"));
        assert_eq!(response.response, WELCOME_MESSAGE);
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_consultation_end_to_end() {
        let sys = system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("user", 16).await.unwrap();

        chat(&sys.bus, "s-42", EXAMPLE).await;
        let processing = next_chat(&mut user).await;
        assert!(processing.is_interim());
        assert_eq!(processing.session_id, "s-42");

        let result = next_chat(&mut user).await;
        assert_eq!(result.kind(), Some("result"));
        assert_eq!(result.metadata["specialty"], "cardiology");
        assert_eq!(result.metadata["condition"], "angina");
        assert_eq!(result.metadata["doctors_found"], 1);
        assert_eq!(result.metadata["specialist_substituted"], false);
        assert!(result.response.contains("**Recommended Specialist:** Cardiology"));
        assert!(result.response.contains("1. Dr. Ada Heart - Cardiologist"));
        assert!(result.response.contains("Always consult with a qualified healthcare professional"));
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_consultation_completes() {
        let sys = system(config(full_agents(), "")).await;
        let outcome = sys.handle.consult("itchy red rash on my arm", None).await.unwrap();
        match &outcome {
            ConsultOutcome::Completed(response) => {
                assert!(response.session_id.starts_with("web-"));
                assert_eq!(response.metadata["specialty"], "dermatology");
                assert_eq!(response.metadata["doctors_found"], 0);
                assert!(response.response.contains("Doctor matching temporarily unavailable"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(outcome.is_success());
        assert_eq!(outcome.to_json()["type"], "result");
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_greeting_short_circuits() {
        let sys = system(config(full_agents(), "")).await;
        let outcome = sys.handle.consult("hey", None).await.unwrap();
        assert_eq!(outcome, ConsultOutcome::Greeting(WELCOME_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_missing_triage_is_a_session_error() {
        let sys = system(config("cardiology = \"cardiology\"", "")).await;
        let outcome = sys.handle.consult(EXAMPLE, None).await.unwrap();
        match outcome {
            ConsultOutcome::Failed(response) => {
                assert!(response.response.starts_with(
                    "I apologize, but I encountered an error: Triage agent not configured"
                ));
                assert_eq!(response.kind(), Some("error"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
        let health = sys.handle.health().await.unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.knowledge_loaded);
    }

    #[tokio::test]
    async fn test_health_reports_knowledge_when_triage_is_wired() {
        let sys = system(config(full_agents(), "")).await;
        let health = sys.handle.health().await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.knowledge_loaded);

        let over_bus = crate::agents::probe_health(&sys.bus, "coordinator", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(over_bus.knowledge_loaded);
        assert_eq!(over_bus.agent_name, "coordinator");
    }

    #[tokio::test]
    async fn test_unmapped_specialist_is_substituted() {
        let sys = system(config("triage = \"triage\"\ncardiology = \"cardiology\"", "")).await;
        let outcome = sys
            .handle
            .consult("I have a terrible headache and weakness", None)
            .await
            .unwrap();
        match outcome {
            ConsultOutcome::Completed(response) => {
                assert_eq!(response.metadata["specialist_substituted"], true);
                assert_eq!(response.metadata["specialty"], "cardiology");
                assert!(response
                    .response
                    .contains("Triage recommended neurology; analysed by the Cardiology specialist instead"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_push_session_is_rejected() {
        let (sys, _triage) = stalled_system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("user", 16).await.unwrap();

        chat(&sys.bus, "dup", EXAMPLE).await;
        assert!(next_chat(&mut user).await.is_interim());

        chat(&sys.bus, "dup", EXAMPLE).await;
        let rejected = next_chat(&mut user).await;
        assert!(rejected.is_error());
        assert_eq!(
            rejected.response,
            SessionError::Duplicate("dup".to_string()).to_string()
        );
        assert_eq!(rejected.metadata["error"], "duplicate session");
        assert_eq!(sys.handle.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let sys = system(config(full_agents(), "")).await;
        let outcome = sys.handle.consult(&"chest pain ".repeat(40), None).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.text().contains("too long"));
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_reaps_stalled_session_and_drops_late_reply() {
        let (sys, mut triage) = stalled_system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("user", 16).await.unwrap();

        chat(&sys.bus, "stalled", EXAMPLE).await;
        assert!(next_chat(&mut user).await.is_interim());
        let routed = triage.recv().await.unwrap();
        assert_eq!(routed.message.kind(), "symptom_routing_request");

        // Not yet expired.
        assert_eq!(sys.handle.sweep(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + chrono::Duration::seconds(600);
        assert_eq!(sys.handle.sweep(later).await.unwrap(), 1);
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);

        let notice = next_chat(&mut user).await;
        assert_eq!(notice.kind(), Some("timeout"));
        assert_eq!(notice.response, TIMEOUT_MESSAGE);
        assert_eq!(notice.metadata["error"], SessionFailure::Timeout.detail());
        assert!(notice.is_error());

        // A routing answer arriving after the reap is ignored.
        sys.bus
            .deliver(
                "triage",
                "coordinator",
                AgentMessage::SpecialtyRecommendation(SpecialtyRecommendation {
                    recommended_specialty: "cardiology".to_string(),
                    confidence: 0.92,
                    urgency_level: UrgencyLevel::Critical,
                    urgency_score: 1.0,
                    reasoning: String::new(),
                    matched_rules: 4,
                    matched_keywords: Vec::new(),
                    secondary_specialty: None,
                    per_specialty_scores: Default::default(),
                    routing_fallback: false,
                    session_id: "stalled".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_beyond_mailbox_capacity() {
        let agents = format!("{}\nmailbox_capacity = 4", full_agents());
        let sys = system(config(&agents, "")).await;

        let chats = (0..60).map(|i| {
            let bus = sys.bus.clone();
            tokio::spawn(async move {
                let message = if i % 2 == 0 { EXAMPLE } else { "an itchy red rash on my arm" };
                crate::agents::converse(
                    &bus,
                    "coordinator",
                    message,
                    Some(format!("load-{}", i)),
                    None,
                    Duration::from_secs(10),
                )
                .await
            })
        });
        let results = tokio::time::timeout(
            Duration::from_secs(20),
            futures::future::join_all(chats),
        )
        .await
        .expect("sessions stalled under mailbox back-pressure");

        for result in results {
            let responses = result.unwrap().unwrap();
            let last = responses.last().unwrap();
            assert_eq!(last.kind(), Some("result"), "{}", last.response);
        }
        let remaining = tokio::time::timeout(Duration::from_secs(2), sys.handle.session_count())
            .await
            .expect("coordinator stopped answering");
        assert_eq!(remaining.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_times_out_and_session_is_removed() {
        let (sys, _triage) = stalled_system(config(
            full_agents(),
            "",
        ))
        .await;
        let short = CoordinatorHandle {
            poll_timeout: Duration::from_millis(100),
            ..sys.handle.clone()
        };
        let outcome = short.consult(EXAMPLE, None).await.unwrap();
        assert_eq!(outcome, ConsultOutcome::TimedOut(TIMEOUT_MESSAGE.to_string()));
        assert!(!outcome.is_success());
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bridge_mode_acknowledges_then_answers() {
        let sys = system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("bridge-client", 16).await.unwrap();
        let inbound = BridgeChatMessage::text(EXAMPLE);
        let msg_id = inbound.msg_id;
        sys.bus
            .deliver("bridge-client", "coordinator", AgentMessage::BridgeChatMessage(inbound))
            .await
            .unwrap();

        let first = user.recv().await.unwrap();
        match first.message {
            AgentMessage::ChatAcknowledgement(ack) => assert_eq!(ack.acknowledged_msg_id, msg_id),
            other => panic!("expected acknowledgement, got {:?}", other),
        }
        let second = tokio::time::timeout(Duration::from_secs(5), user.recv())
            .await
            .unwrap()
            .unwrap();
        match second.message {
            AgentMessage::BridgeChatMessage(reply) => {
                assert!(reply.joined_text().starts_with("**PulseBridge AI Medical Consultation**"));
            }
            other => panic!("expected bridge reply, got {:?}", other),
        }
        assert_eq!(sys.handle.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_web_query_gets_single_response() {
        let sys = system(config(full_agents(), "")).await;
        let mut user = sys.bus.register("web-client", 16).await.unwrap();
        sys.bus
            .deliver(
                "web-client",
                "coordinator",
                AgentMessage::WebQuery(WebQuery {
                    message: EXAMPLE.to_string(),
                    patient: Some(PatientProfile {
                        age: Some(64),
                        gender: None,
                        history: vec!["hypertension".to_string()],
                    }),
                }),
            )
            .await
            .unwrap();

        let envelope = tokio::time::timeout(Duration::from_secs(5), user.recv())
            .await
            .unwrap()
            .unwrap();
        match envelope.message {
            AgentMessage::WebQueryResponse(reply) => {
                assert!(reply.success);
                assert!(reply.response.contains("Patient has 1 significant risk factors including hypertension."));
            }
            other => panic!("expected web query response, got {:?}", other),
        }
    }

    #[test]
    fn test_final_response_without_doctors() {
        let triage = SpecialtyRecommendation {
            recommended_specialty: "dermatology".to_string(),
            confidence: 0.93,
            urgency_level: UrgencyLevel::Moderate,
            urgency_score: 0.6,
            reasoning: String::new(),
            matched_rules: 3,
            matched_keywords: vec!["rash".to_string()],
            secondary_specialty: None,
            per_specialty_scores: Default::default(),
            routing_fallback: false,
            session_id: "s".to_string(),
        };
        let specialist = SpecialistAnalysisResponse {
            specialty: "dermatology".to_string(),
            diagnosis: "Possible contact dermatitis.".to_string(),
            condition: "contact_dermatitis".to_string(),
            confidence: 0.8,
            urgency_score: 0.4,
            risk_level: UrgencyLevel::Low,
            recommendations: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            rules_matched: 2,
            risk_factors: Vec::new(),
            enhanced: true,
            reasoning_summary: String::new(),
            session_id: "s".to_string(),
        };

        let response = final_response("s", &triage, &specialist, &[], false);
        assert!(response.response.contains("**Diagnostic Confidence:** 80%"));
        assert!(response.response.contains("**Urgency Level:** Low"));
        assert!(response.response.contains("3. c\n"));
        assert!(!response.response.contains("4. d"));
        assert!(response.response.contains("**Note:** Doctor matching temporarily unavailable"));
        assert!(response.response.contains("- 5 reasoning rules evaluated"));
        assert!(response.response.contains("- Triage routing confidence: 93%"));
        assert!(response.response.contains("- Enhanced with natural language processing"));
        assert_eq!(response.metadata["rules_total"], 5);
        assert_eq!(response.metadata["urgency"], "low");
        assert_eq!(response.metadata["enhanced"], true);
    }
}
