pub mod bus;
pub mod config;
pub mod doctors;
pub mod engine;
pub mod enhancer;
pub mod error;
pub mod ipc;
pub mod knowledge;
pub mod models;
pub mod normalizer;
pub mod protocol;
pub mod routing;

pub use bus::{BusError, Mailbox, MessageBus};
pub use config::PulseConfig;
pub use doctors::{create_directory, DoctorDirectory, DirectoryError};
pub use engine::ReasoningEngine;
pub use enhancer::{create_enhancer, enhance_or_original, EnhancementRequest, TextEnhancer};
pub use error::PulseError;
pub use knowledge::{KnowledgeBase, KnowledgeError, KnowledgeRegistry};
pub use routing::{routing_reasoning, TriageRouter};
