use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::protocol::{ChatResponse, PatientProfile, SpecialistAnalysisResponse, SpecialtyRecommendation};

/// Lifecycle of one consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Created,
    RoutingSent,
    SpecialistSent,
    DoctorsQueried,
    Complete,
    Error,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Error | SessionState::TimedOut
        )
    }

    pub fn can_advance_to(&self, next: SessionState) -> bool {
        match (self, next) {
            (from, SessionState::Error | SessionState::TimedOut) => !from.is_terminal(),
            (SessionState::Created, SessionState::RoutingSent)
            | (SessionState::RoutingSent, SessionState::SpecialistSent)
            | (SessionState::SpecialistSent, SessionState::DoctorsQueried)
            | (SessionState::DoctorsQueried, SessionState::Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "CREATED",
            SessionState::RoutingSent => "ROUTING_SENT",
            SessionState::SpecialistSent => "SPECIALIST_SENT",
            SessionState::DoctorsQueried => "DOCTORS_QUERIED",
            SessionState::Complete => "COMPLETE",
            SessionState::Error => "ERROR",
            SessionState::TimedOut => "TIMED_OUT",
        };
        f.write_str(name)
    }
}

/// How the final response reaches the caller. Fixed when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Push,
    Poll,
    Bridge,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: SessionState,
        to: SessionState,
    },

    #[error("Session {0} is already in progress. Please wait for the current analysis to finish.")]
    Duplicate(String),
}

/// Orchestration failures that end a session with a user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    ConfigurationMissing(String),
    CollaboratorUnavailable(String),
    Timeout,
}

pub const TIMEOUT_MESSAGE: &str =
    "Sorry, the analysis is taking longer than expected. Please try again in a moment.";

impl SessionFailure {
    pub fn user_message(&self) -> String {
        match self {
            SessionFailure::ConfigurationMissing(detail)
            | SessionFailure::CollaboratorUnavailable(detail) => format!(
                "I apologize, but I encountered an error: {}\n\nPlease try again or seek immediate medical attention if urgent.",
                detail
            ),
            SessionFailure::Timeout => TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn terminal_state(&self) -> SessionState {
        match self {
            SessionFailure::Timeout => SessionState::TimedOut,
            _ => SessionState::Error,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            SessionFailure::ConfigurationMissing(detail)
            | SessionFailure::CollaboratorUnavailable(detail) => detail,
            SessionFailure::Timeout => "timed out",
        }
    }
}

/// In-memory record of one consultation, owned by the coordinator loop.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub owner: String,
    pub raw_symptoms: String,
    pub patient: PatientProfile,
    pub created_at: DateTime<Utc>,
    pub mode: DeliveryMode,
    pub triage: Option<SpecialtyRecommendation>,
    pub specialist: Option<SpecialistAnalysisResponse>,
    pub specialist_substituted: bool,
    pub final_response: Option<ChatResponse>,
    state: SessionState,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        raw_symptoms: impl Into<String>,
        patient: PatientProfile,
        mode: DeliveryMode,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            raw_symptoms: raw_symptoms.into(),
            patient,
            created_at,
            mode,
            triage: None,
            specialist: None,
            specialist_substituted: false,
            final_response: None,
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_advance_to(next) {
            return Err(SessionError::IllegalTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) > ttl
    }

    /// A poll-mode session is ready once its final response is stored.
    pub fn is_ready(&self) -> bool {
        self.final_response.is_some()
    }
}
