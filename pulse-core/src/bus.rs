//! In-process message bus connecting agents by address.
//!
//! Each registered address owns a bounded mpsc mailbox. Delivery order is
//! FIFO per sender/recipient pair and nothing stronger.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{AgentMessage, Envelope};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no agent registered at {0}")]
    UnknownRecipient(String),

    #[error("mailbox for {0} is closed")]
    MailboxClosed(String),

    #[error("address {0} is already registered")]
    AddressInUse(String),
}

#[derive(Clone, Default)]
pub struct MessageBus {
    routes: Arc<RwLock<HashMap<String, mpsc::Sender<Envelope>>>>,
}

/// Receiving end of a registered address.
pub struct Mailbox {
    address: String,
    receiver: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, address: &str, capacity: usize) -> Result<Mailbox, BusError> {
        let mut routes = self.routes.write().await;
        if let Some(existing) = routes.get(address) {
            if !existing.is_closed() {
                return Err(BusError::AddressInUse(address.to_string()));
            }
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        routes.insert(address.to_string(), tx);
        tracing::debug!(address = %address, "Registered mailbox");
        Ok(Mailbox {
            address: address.to_string(),
            receiver: rx,
        })
    }

    pub async fn deregister(&self, address: &str) {
        if self.routes.write().await.remove(address).is_some() {
            tracing::debug!(address = %address, "Deregistered mailbox");
        }
    }

    pub async fn is_registered(&self, address: &str) -> bool {
        self.routes
            .read()
            .await
            .get(address)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        let sender = self
            .routes
            .read()
            .await
            .get(&envelope.recipient)
            .cloned()
            .ok_or_else(|| BusError::UnknownRecipient(envelope.recipient.clone()))?;

        let recipient = envelope.recipient.clone();
        sender
            .send(envelope)
            .await
            .map_err(|_| BusError::MailboxClosed(recipient))
    }

    /// Convenience wrapper building the envelope.
    pub async fn deliver(
        &self,
        from: &str,
        to: &str,
        message: AgentMessage,
    ) -> Result<(), BusError> {
        self.send(Envelope::new(from, to, message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WebQueryResponse;

    fn reply(text: &str) -> AgentMessage {
        AgentMessage::WebQueryResponse(WebQueryResponse {
            response: text.to_string(),
            success: true,
        })
    }

    #[tokio::test]
    async fn test_send_to_registered_mailbox() {
        let bus = MessageBus::new();
        let mut mailbox = bus.register("agent-a", 4).await.unwrap();

        bus.deliver("agent-b", "agent-a", reply("hi")).await.unwrap();

        let envelope = mailbox.recv().await.unwrap();
        assert_eq!(envelope.sender, "agent-b");
        assert_eq!(envelope.recipient, "agent-a");
        assert_eq!(envelope.message, reply("hi"));
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_an_error() {
        let bus = MessageBus::new();
        let err = bus.deliver("a", "nobody", reply("x")).await.unwrap_err();
        assert_eq!(err, BusError::UnknownRecipient("nobody".to_string()));
    }

    #[tokio::test]
    async fn test_fifo_per_sender() {
        let bus = MessageBus::new();
        let mut mailbox = bus.register("sink", 16).await.unwrap();
        for i in 0..5 {
            bus.deliver("src", "sink", reply(&i.to_string())).await.unwrap();
        }
        for i in 0..5 {
            let envelope = mailbox.recv().await.unwrap();
            assert_eq!(envelope.message, reply(&i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_dropped_mailbox_reports_closed_and_can_reregister() {
        let bus = MessageBus::new();
        let mailbox = bus.register("temp", 1).await.unwrap();
        assert!(bus.is_registered("temp").await);
        drop(mailbox);

        assert!(!bus.is_registered("temp").await);
        let err = bus.deliver("a", "temp", reply("late")).await.unwrap_err();
        assert_eq!(err, BusError::MailboxClosed("temp".to_string()));

        assert!(bus.register("temp", 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_live_registration_rejected() {
        let bus = MessageBus::new();
        let _mailbox = bus.register("dup", 1).await.unwrap();
        assert_eq!(
            bus.register("dup", 1).await.err(),
            Some(BusError::AddressInUse("dup".to_string()))
        );
        bus.deregister("dup").await;
        assert!(!bus.is_registered("dup").await);
    }
}
