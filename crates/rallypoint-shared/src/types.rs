use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::SYSTEM_SENDER;

// Peer identity as reported by the mesh transport. Opaque to this layer;
// stability across reconnects is the transport's problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display form (at most 8 bytes) for logs and system notices.
    /// The id is transport-supplied, so the cut backs up to the nearest
    /// char boundary rather than assuming ASCII.
    pub fn short(&self) -> &str {
        let mut end = self.0.len().min(8);
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coordination role a peer can announce to the group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Scout,
    Medic,
    Leader,
    Helper,
    Analyst,
    Unassigned,
}

impl Role {
    /// Lowercase wire name. `Unassigned` never travels on the wire.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Scout => "scout",
            Role::Medic => "medic",
            Role::Leader => "leader",
            Role::Helper => "helper",
            Role::Analyst => "analyst",
            Role::Unassigned => "unassigned",
        }
    }

    /// Parse a wire or user-typed role name, case-insensitively.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scout" => Some(Role::Scout),
            "medic" => Some(Role::Medic),
            "leader" => Some(Role::Leader),
            "helper" => Some(Role::Helper),
            "analyst" => Some(Role::Analyst),
            _ => None,
        }
    }

    /// The role names a user may assign with the role command.
    pub fn assignable() -> &'static [&'static str] {
        &["scout", "medic", "leader", "helper", "analyst"]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// A peer's announced role, last-write-wins by `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRole {
    pub peer_id: PeerId,
    pub role: Role,
    /// Epoch millis carried by the ROLE_UPDATE that set this entry.
    pub updated_at: i64,
}

/// Delivery progress of a sent message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    /// Multi-recipient send that reached only part of the group.
    PartiallyDelivered { reached: u32, total: u32 },
    Failed,
}

impl DeliveryStatus {
    /// Position in the forward-only transition order. `Failed` is terminal
    /// and reachable from anywhere; `PartiallyDelivered` sits between Sent
    /// and Delivered.
    fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Sending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::PartiallyDelivered { .. } => 2,
            DeliveryStatus::Delivered => 3,
            DeliveryStatus::Read => 4,
            DeliveryStatus::Failed => 5,
        }
    }

    /// Whether a transition from `self` to `next` moves forward.
    /// Backward transitions are rejected; equal-rank updates are allowed
    /// only for `PartiallyDelivered`, whose reach count may grow.
    pub fn can_advance_to(&self, next: &DeliveryStatus) -> bool {
        if matches!(self, DeliveryStatus::Failed) {
            return false;
        }
        match (self, next) {
            (
                DeliveryStatus::PartiallyDelivered { .. },
                DeliveryStatus::PartiallyDelivered { .. },
            ) => true,
            _ => next.rank() > self.rank(),
        }
    }
}

/// A chat message, local or remote, held by the chat state message lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique, immutable after creation.
    pub id: String,
    /// Display nickname of the sender.
    pub sender: String,
    /// Transport-verified peer id of the sender, when known.
    pub sender_peer_id: Option<PeerId>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Channel the message belongs to, if any.
    pub channel: Option<String>,
    pub is_private: bool,
    /// Locally generated notice, never sent over the wire.
    pub is_system: bool,
    pub delivery_status: DeliveryStatus,
}

impl Message {
    /// Build a message for local sending into the given scope.
    pub fn outgoing(sender: &str, sender_peer_id: PeerId, content: &str, scope: &Scope) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            sender_peer_id: Some(sender_peer_id),
            content: content.to_string(),
            timestamp: Utc::now(),
            channel: scope.channel_name().map(str::to_string),
            is_private: matches!(scope, Scope::Private(_)),
            is_system: false,
            delivery_status: DeliveryStatus::Sending,
        }
    }

    /// Build a local system notice for the given scope.
    pub fn system(content: &str, scope: &Scope) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: SYSTEM_SENDER.to_string(),
            sender_peer_id: None,
            content: content.to_string(),
            timestamp: Utc::now(),
            channel: scope.channel_name().map(str::to_string),
            is_private: matches!(scope, Scope::Private(_)),
            is_system: true,
            delivery_status: DeliveryStatus::Delivered,
        }
    }

}

/// Destination context of a message: the public mesh, a named channel, or a
/// private peer-to-peer conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Scope {
    Main,
    Channel(String),
    Private(PeerId),
}

impl Scope {
    pub fn channel_name(&self) -> Option<&str> {
        match self {
            Scope::Channel(name) => Some(name),
            _ => None,
        }
    }

    /// The transport scope string handed to `Transport::send`, `None` for
    /// the public main scope.
    pub fn wire_scope(&self) -> Option<String> {
        match self {
            Scope::Main => None,
            Scope::Channel(name) => Some(name.clone()),
            Scope::Private(peer) => Some(peer.0.clone()),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Main => write!(f, "main"),
            Scope::Channel(name) => write!(f, "#{name}"),
            Scope::Private(peer) => write!(f, "@{}", peer.short()),
        }
    }
}
