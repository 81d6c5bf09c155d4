//! # Endpoint Port
//!
//! Outbound port for moving messages between MAL nodes.

use crate::TransportError;
use async_trait::async_trait;
use mal_types::{Message, MessageBody, MessageHeader, Uri};
use std::sync::Arc;

/// Receives every inbound message of an endpoint.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Message);
}

/// A transport endpoint with its own URI.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// URI other parties use to reach this endpoint.
    fn uri(&self) -> &Uri;

    /// Send a message to `message.header.uri_to`.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Install the listener for inbound messages, replacing any previous one.
    fn set_message_listener(&self, listener: Arc<dyn MessageListener>);

    /// Build a message originating from this endpoint.
    ///
    /// Stamps `uri_from` and fills a missing timestamp.
    fn create_message(&self, mut header: MessageHeader, body: MessageBody) -> Message {
        header.uri_from = self.uri().clone();
        if header.timestamp == 0 {
            header.timestamp = MessageHeader::now_ms();
        }
        Message::new(header, body)
    }

    /// Stop receiving. Later sends to this URI fail.
    async fn close(&self) -> Result<(), TransportError>;
}
