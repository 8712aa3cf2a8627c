//! Narrow interface to the mesh transport collaborator.
//!
//! The core never dials, encrypts, or retries; it hands outbound text to
//! [`Transport::send`] fire-and-forget and receives inbound activity as
//! [`InboundEvent`] values fed into the engine queue by the transport's
//! callbacks.

use chrono::{DateTime, Utc};

use rallypoint_shared::types::{Message, PeerId};

/// Outbound side of the mesh transport.
///
/// `scope` is `None` for the public main scope, a channel name for channel
/// messages, or a peer id for private messages. Backpressure and retry are
/// the transport's concern.
pub trait Transport: Send + Sync {
    fn send(&self, text: &str, mentions: &[String], scope: Option<&str>);
}

/// An inbound transport event, consumed exactly once by the event router.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    MessageReceived(Message),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    DeliveryAck {
        message_id: String,
        recipient: PeerId,
        timestamp: DateTime<Utc>,
    },
    ReadReceipt {
        message_id: String,
        reader: PeerId,
        timestamp: DateTime<Utc>,
    },
}
