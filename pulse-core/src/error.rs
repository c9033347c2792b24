use thiserror::Error;

use crate::bus::BusError;
use crate::knowledge::KnowledgeError;
use crate::models::session::SessionError;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Other error: {0}")]
    Other(String),
}
