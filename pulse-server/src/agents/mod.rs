//! Bus actors: the triage router, one specialist per specialty and the
//! user-facing coordinator.
//!
//! Triage and specialist agents share [`run_agent`]: one inbound envelope at
//! a time, the reply (if any) goes back to the envelope's sender. The
//! coordinator has its own loop because it also serves commands from
//! [`coordinator::CoordinatorHandle`].

pub mod coordinator;
pub mod specialist;
pub mod triage;

use async_trait::async_trait;
use chrono::Utc;
use pulse_core::bus::BusError;
use pulse_core::models::Specialty;
use pulse_core::protocol::{
    AgentMessage, ChatMessage, ChatResponse, HealthCheck, HealthResponse, HealthStatus,
    PatientProfile,
};
use pulse_core::{
    DoctorDirectory, KnowledgeRegistry, Mailbox, MessageBus, PulseConfig, PulseError,
    ReasoningEngine, TextEnhancer, TriageRouter,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use coordinator::{ConsultOutcome, Coordinator, CoordinatorHandle};
pub use specialist::SpecialistAgent;
pub use triage::TriageAgent;

#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Handle one message. `None` means nothing is sent back.
    async fn handle(&self, message: AgentMessage) -> Option<AgentMessage>;
}

pub async fn run_agent<A: Agent>(
    agent: A,
    bus: MessageBus,
    mut mailbox: Mailbox,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(agent = agent.name(), address = mailbox.address(), "Agent started");

    loop {
        tokio::select! {
            envelope = mailbox.recv() => {
                let Some(envelope) = envelope else {
                    tracing::warn!(agent = agent.name(), "Mailbox closed");
                    break;
                };
                let sender = envelope.sender;
                let kind = envelope.message.kind();
                match agent.handle(envelope.message).await {
                    // Sent from a separate task so a full recipient mailbox
                    // never stops this loop from draining its own.
                    Some(reply) => {
                        let bus = bus.clone();
                        let from = mailbox.address().to_string();
                        tokio::spawn(async move {
                            if let Err(e) = bus.deliver(&from, &sender, reply).await {
                                tracing::warn!(
                                    agent = %from,
                                    recipient = %sender,
                                    error = %e,
                                    "Reply could not be delivered"
                                );
                            }
                        });
                    }
                    None => tracing::debug!(agent = agent.name(), kind, "No reply"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!(agent = agent.name(), "Shutting down agent...");
                break;
            }
        }
    }

    bus.deregister(mailbox.address()).await;
}

/// Register and spawn every configured agent plus the coordinator.
/// Agents without an address are skipped; the coordinator reports the gap
/// per session.
pub async fn spawn_agents(
    config: &PulseConfig,
    bus: &MessageBus,
    registry: &KnowledgeRegistry,
    enhancer: Arc<dyn TextEnhancer>,
    directory: Arc<dyn DoctorDirectory>,
    shutdown: &broadcast::Sender<()>,
) -> Result<CoordinatorHandle, PulseError> {
    let capacity = config.agents.mailbox_capacity;

    match config.agents.triage_address() {
        Some(address) => {
            let router = TriageRouter::new(registry.triage(), &config.routing);
            let mailbox = bus.register(address, capacity).await?;
            tokio::spawn(run_agent(
                TriageAgent::new(address, router),
                bus.clone(),
                mailbox,
                shutdown.subscribe(),
            ));
        }
        None => tracing::warn!("Triage agent not configured, consultations will fail"),
    }

    for specialty in Specialty::ALL {
        let Some(address) = config.agents.specialist_address(specialty) else {
            tracing::info!(specialty = %specialty, "Specialist agent not configured");
            continue;
        };
        let engine = ReasoningEngine::new(registry.specialty(specialty))?;
        let mailbox = bus.register(address, capacity).await?;
        tokio::spawn(run_agent(
            SpecialistAgent::new(address, engine, Arc::clone(&enhancer)),
            bus.clone(),
            mailbox,
            shutdown.subscribe(),
        ));
    }

    let (coordinator, handle) = Coordinator::new(config, bus.clone(), directory);
    let mailbox = bus.register(&config.agents.coordinator, capacity).await?;
    tokio::spawn(coordinator.run(mailbox, shutdown.subscribe()));
    Ok(handle)
}

pub fn health_response(
    agent_name: &str,
    knowledge_loaded: bool,
    enhancer_available: bool,
) -> HealthResponse {
    HealthResponse {
        agent_name: agent_name.to_string(),
        status: if knowledge_loaded {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        knowledge_loaded,
        enhancer_available,
        timestamp: Utc::now(),
    }
}

// ============================================================================
// Calling agents from outside the bus
// ============================================================================

#[derive(Error, Debug)]
pub enum AgentCallError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("no reply from {address} within {seconds}s")]
    Timeout { address: String, seconds: u64 },

    #[error("unexpected reply from {address}: {kind}")]
    UnexpectedReply { address: String, kind: &'static str },
}

/// Temporary mailbox used by a single external caller.
struct ClientMailbox {
    bus: MessageBus,
    mailbox: Mailbox,
}

impl ClientMailbox {
    async fn open(bus: &MessageBus, prefix: &str) -> Result<Self, AgentCallError> {
        let address = format!("{}-{}", prefix, Uuid::new_v4());
        let mailbox = bus.register(&address, 16).await?;
        Ok(Self {
            bus: bus.clone(),
            mailbox,
        })
    }

    fn address(&self) -> &str {
        self.mailbox.address()
    }

    async fn send(&self, to: &str, message: AgentMessage) -> Result<(), AgentCallError> {
        Ok(self.bus.deliver(self.address(), to, message).await?)
    }

    async fn next(&mut self, from: &str, timeout: Duration) -> Result<AgentMessage, AgentCallError> {
        match tokio::time::timeout(timeout, self.mailbox.recv()).await {
            Ok(Some(envelope)) => Ok(envelope.message),
            Ok(None) => Err(AgentCallError::Bus(BusError::MailboxClosed(
                self.address().to_string(),
            ))),
            Err(_) => Err(AgentCallError::Timeout {
                address: from.to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn close(self) {
        self.bus.deregister(self.mailbox.address()).await;
    }
}

/// Send one message and wait for the first reply.
pub async fn ask(
    bus: &MessageBus,
    address: &str,
    message: AgentMessage,
    timeout: Duration,
) -> Result<AgentMessage, AgentCallError> {
    let mut client = ClientMailbox::open(bus, "client").await?;
    let result = match client.send(address, message).await {
        Ok(()) => client.next(address, timeout).await,
        Err(e) => Err(e),
    };
    client.close().await;
    result
}

pub async fn probe_health(
    bus: &MessageBus,
    address: &str,
    timeout: Duration,
) -> Result<HealthResponse, AgentCallError> {
    let check = AgentMessage::HealthCheck(HealthCheck {
        requester: "health-probe".to_string(),
        timestamp: Utc::now(),
    });
    match ask(bus, address, check, timeout).await? {
        AgentMessage::HealthResponse(health) => Ok(health),
        other => Err(AgentCallError::UnexpectedReply {
            address: address.to_string(),
            kind: other.kind(),
        }),
    }
}

/// Push-mode chat with the coordinator: every [`ChatResponse`] received up
/// to and including the first one that is not an interim notice.
pub async fn converse(
    bus: &MessageBus,
    coordinator: &str,
    message: &str,
    session_id: Option<String>,
    patient: Option<PatientProfile>,
    timeout: Duration,
) -> Result<Vec<ChatResponse>, AgentCallError> {
    let mut client = ClientMailbox::open(bus, "chat").await?;
    let session_id = session_id.unwrap_or_else(|| format!("chat-{}", Uuid::new_v4()));
    let result = exchange(&mut client, coordinator, message, session_id, patient, timeout).await;
    client.close().await;
    result
}

async fn exchange(
    client: &mut ClientMailbox,
    coordinator: &str,
    message: &str,
    session_id: String,
    patient: Option<PatientProfile>,
    timeout: Duration,
) -> Result<Vec<ChatResponse>, AgentCallError> {
    client
        .send(
            coordinator,
            AgentMessage::ChatMessage(ChatMessage {
                message: message.to_string(),
                session_id,
                patient,
            }),
        )
        .await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut responses = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match client.next(coordinator, remaining).await? {
            AgentMessage::ChatResponse(response) => {
                let done = !response.is_interim();
                responses.push(response);
                if done {
                    return Ok(responses);
                }
            }
            other => tracing::debug!(kind = other.kind(), "Ignoring non-chat reply"),
        }
    }
}
