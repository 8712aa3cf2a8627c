//! Shared chat state aggregate.
//!
//! Single logical owner of every mutable structure in the core: peer
//! roster, channels, message lists, roles, and runtime flags. All mutation
//! funnels through the engine task (event router + command dispatcher), so
//! there is no concurrent-writer hazard and no field-level locking.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use rallypoint_shared::protocol::RoleUpdate;
use rallypoint_shared::types::{DeliveryStatus, Message, PeerId, PeerRole, Role, Scope};

/// Central chat state.
pub struct ChatState {
    /// Peers the transport currently reports as reachable.
    connected_peers: HashSet<PeerId>,
    /// Last nickname observed for each peer.
    nicknames: HashMap<PeerId, String>,
    /// Channels the local user has joined.
    joined_channels: HashSet<String>,
    /// Public mesh-wide messages.
    main_messages: Vec<Message>,
    /// Per-channel message lists.
    channel_messages: HashMap<String, Vec<Message>>,
    /// Per-peer private conversation lists.
    private_messages: HashMap<PeerId, Vec<Message>>,
    /// Announced roles, last-write-wins by update timestamp.
    roles: HashMap<PeerId, PeerRole>,
    /// Identity fingerprints reported by the transport's verification layer.
    fingerprints: HashMap<PeerId, String>,
    favorites: HashSet<PeerId>,
    blocked: HashSet<PeerId>,
    /// Whether inbound public messages may trigger automatic AI replies.
    pub auto_respond: bool,
    /// Scope user input and `/clear` act on.
    pub active_scope: Scope,
}

/// Serializable summary handed out through engine snapshot queries.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub connected_peers: Vec<String>,
    pub joined_channels: Vec<String>,
    pub main_message_count: usize,
    pub auto_respond: bool,
    pub active_scope: String,
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            connected_peers: HashSet::new(),
            nicknames: HashMap::new(),
            joined_channels: HashSet::new(),
            main_messages: Vec::new(),
            channel_messages: HashMap::new(),
            private_messages: HashMap::new(),
            roles: HashMap::new(),
            fingerprints: HashMap::new(),
            favorites: HashSet::new(),
            blocked: HashSet::new(),
            auto_respond: false,
            active_scope: Scope::Main,
        }
    }

    // --- Peer roster ---

    /// Record a peer as connected. Returns `true` if it was not already
    /// in the set.
    pub fn peer_connected(&mut self, peer: PeerId) -> bool {
        self.connected_peers.insert(peer)
    }

    /// Remove a peer from the connected set. Returns `true` if it was
    /// present. Roles and nicknames are kept; the peer may come back.
    pub fn peer_disconnected(&mut self, peer: &PeerId) -> bool {
        self.connected_peers.remove(peer)
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected_peers.contains(peer)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.connected_peers.iter().cloned().collect();
        peers.sort();
        peers
    }

    /// Remember the nickname a peer last used.
    pub fn note_nickname(&mut self, peer: &PeerId, nickname: &str) {
        if nickname.is_empty() {
            return;
        }
        self.nicknames.insert(peer.clone(), nickname.to_string());
    }

    pub fn nickname_of(&self, peer: &PeerId) -> Option<&str> {
        self.nicknames.get(peer).map(String::as_str)
    }

    /// Resolve a nickname to a peer id with a linear roster scan,
    /// case-insensitively. Fine at the expected scale of low tens of peers.
    pub fn resolve_nickname(&self, nickname: &str) -> Option<PeerId> {
        self.nicknames
            .iter()
            .find(|(_, nick)| nick.eq_ignore_ascii_case(nickname))
            .map(|(peer, _)| peer.clone())
    }

    pub fn set_fingerprint(&mut self, peer: &PeerId, fingerprint: &str) {
        self.fingerprints
            .insert(peer.clone(), fingerprint.to_string());
    }

    pub fn fingerprint_of(&self, peer: &PeerId) -> Option<&str> {
        self.fingerprints.get(peer).map(String::as_str)
    }

    // --- Channels ---

    /// Join a channel. Returns `true` if newly joined.
    pub fn join_channel(&mut self, channel: &str) -> bool {
        self.channel_messages.entry(channel.to_string()).or_default();
        self.joined_channels.insert(channel.to_string())
    }

    pub fn leave_channel(&mut self, channel: &str) -> bool {
        self.joined_channels.remove(channel)
    }

    pub fn is_in_channel(&self, channel: &str) -> bool {
        self.joined_channels.contains(channel)
    }

    pub fn joined_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.joined_channels.iter().cloned().collect();
        channels.sort();
        channels
    }

    // --- Messages ---

    /// Append a message to the list its scope selects. Private messages
    /// are filed under `counterparty`: the sender for inbound, the
    /// recipient for outbound.
    pub fn add_message(&mut self, message: Message, counterparty: Option<&PeerId>) {
        if message.is_private {
            let Some(peer) = counterparty else {
                debug!(id = %message.id, "Private message without counterparty dropped");
                return;
            };
            self.private_messages
                .entry(peer.clone())
                .or_default()
                .push(message);
        } else if let Some(channel) = message.channel.clone() {
            self.channel_messages
                .entry(channel)
                .or_default()
                .push(message);
        } else {
            self.main_messages.push(message);
        }
    }

    /// Append a system notice to the scope it names.
    pub fn add_system_message(&mut self, content: &str, scope: &Scope) {
        let message = Message::system(content, scope);
        let counterparty = match scope {
            Scope::Private(peer) => Some(peer.clone()),
            _ => None,
        };
        self.add_message(message, counterparty.as_ref());
    }

    /// Append streamed content to a message found by id. Returns `false`
    /// when the id is unknown.
    pub fn append_to_message(&mut self, id: &str, chunk: &str) -> bool {
        match self.find_message_mut(id) {
            Some(message) => {
                message.content.push_str(chunk);
                true
            }
            None => false,
        }
    }

    pub fn message_content(&self, id: &str) -> Option<&str> {
        self.all_messages().find(|m| m.id == id).map(|m| m.content.as_str())
    }

    /// Advance a message's delivery status. Backward transitions are
    /// rejected so redundant or late receipts cannot regress state.
    /// Returns `true` only when the status actually changed.
    pub fn update_delivery_status(&mut self, id: &str, next: DeliveryStatus) -> bool {
        match self.find_message_mut(id) {
            Some(message) => {
                if message.delivery_status.can_advance_to(&next) {
                    message.delivery_status = next;
                    true
                } else {
                    debug!(
                        id,
                        current = ?message.delivery_status,
                        rejected = ?next,
                        "Ignoring backward delivery transition"
                    );
                    false
                }
            }
            // The message may have scrolled out of retained history.
            None => false,
        }
    }

    pub fn messages_in_scope(&self, scope: &Scope) -> &[Message] {
        match scope {
            Scope::Main => &self.main_messages,
            Scope::Channel(name) => self
                .channel_messages
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            Scope::Private(peer) => self
                .private_messages
                .get(peer)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// The most recent non-system messages in a scope, oldest first.
    pub fn recent_messages(&self, scope: &Scope, limit: usize) -> Vec<&Message> {
        let list = self.messages_in_scope(scope);
        let mut recent: Vec<&Message> = list
            .iter()
            .rev()
            .filter(|m| !m.is_system)
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }

    /// Explicit user action: drop all messages in a scope.
    pub fn clear_scope(&mut self, scope: &Scope) {
        match scope {
            Scope::Main => self.main_messages.clear(),
            Scope::Channel(name) => {
                if let Some(list) = self.channel_messages.get_mut(name) {
                    list.clear();
                }
            }
            Scope::Private(peer) => {
                if let Some(list) = self.private_messages.get_mut(peer) {
                    list.clear();
                }
            }
        }
    }

    fn find_message_mut(&mut self, id: &str) -> Option<&mut Message> {
        if let Some(m) = self.main_messages.iter_mut().find(|m| m.id == id) {
            return Some(m);
        }
        for list in self.channel_messages.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == id) {
                return Some(m);
            }
        }
        for list in self.private_messages.values_mut() {
            if let Some(m) = list.iter_mut().find(|m| m.id == id) {
                return Some(m);
            }
        }
        None
    }

    fn all_messages(&self) -> impl Iterator<Item = &Message> {
        self.main_messages
            .iter()
            .chain(self.channel_messages.values().flatten())
            .chain(self.private_messages.values().flatten())
    }

    // --- Roles ---

    /// Apply a verified role update, last-write-wins by timestamp.
    /// Returns `true` if the role table changed.
    pub fn apply_role_update(&mut self, update: RoleUpdate) -> bool {
        if let Some(existing) = self.roles.get(&update.peer_id) {
            if existing.updated_at > update.timestamp {
                debug!(peer = %update.peer_id, "Stale role update ignored");
                return false;
            }
            if existing.role == update.role && existing.updated_at == update.timestamp {
                return false;
            }
        }
        self.roles.insert(
            update.peer_id.clone(),
            PeerRole {
                peer_id: update.peer_id,
                role: update.role,
                updated_at: update.timestamp,
            },
        );
        true
    }

    pub fn role_of(&self, peer: &PeerId) -> Role {
        self.roles
            .get(peer)
            .map(|entry| entry.role)
            .unwrap_or(Role::Unassigned)
    }

    // --- Favorites and blocking ---

    pub fn set_favorite(&mut self, peer: &PeerId, favorite: bool) -> bool {
        if favorite {
            self.favorites.insert(peer.clone())
        } else {
            self.favorites.remove(peer)
        }
    }

    pub fn is_favorite(&self, peer: &PeerId) -> bool {
        self.favorites.contains(peer)
    }

    pub fn set_blocked(&mut self, peer: &PeerId, blocked: bool) -> bool {
        if blocked {
            self.blocked.insert(peer.clone())
        } else {
            self.blocked.remove(peer)
        }
    }

    pub fn is_blocked(&self, peer: &PeerId) -> bool {
        self.blocked.contains(peer)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            connected_peers: self
                .connected_peers()
                .iter()
                .map(|p| p.0.clone())
                .collect(),
            joined_channels: self.joined_channels(),
            main_message_count: self.main_messages.len(),
            auto_respond: self.auto_respond,
            active_scope: self.active_scope.to_string(),
        }
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plain_message(id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            sender: "ana".into(),
            sender_peer_id: Some(PeerId::from("P1")),
            content: content.to_string(),
            timestamp: Utc::now(),
            channel: None,
            is_private: false,
            is_system: false,
            delivery_status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_peer_roster() {
        let mut state = ChatState::new();
        let p1 = PeerId::from("P1");
        assert!(state.peer_connected(p1.clone()));
        assert!(!state.peer_connected(p1.clone()));
        state.note_nickname(&p1, "Ana");
        assert_eq!(state.resolve_nickname("ana"), Some(p1.clone()));
        assert_eq!(state.resolve_nickname("bob"), None);
        assert!(state.peer_disconnected(&p1));
        assert!(!state.peer_disconnected(&p1));
        // Nickname survives the disconnect
        assert_eq!(state.nickname_of(&p1), Some("Ana"));
    }

    #[test]
    fn test_messages_file_by_scope() {
        let mut state = ChatState::new();
        state.add_message(plain_message("m1", "hi all"), None);

        let mut channel_msg = plain_message("m2", "in channel");
        channel_msg.channel = Some("rescue".into());
        state.add_message(channel_msg, None);

        let mut private_msg = plain_message("m3", "psst");
        private_msg.is_private = true;
        let p1 = PeerId::from("P1");
        state.add_message(private_msg, Some(&p1));

        assert_eq!(state.messages_in_scope(&Scope::Main).len(), 1);
        assert_eq!(
            state
                .messages_in_scope(&Scope::Channel("rescue".into()))
                .len(),
            1
        );
        assert_eq!(state.messages_in_scope(&Scope::Private(p1)).len(), 1);
    }

    #[test]
    fn test_delivery_status_monotonic() {
        let mut state = ChatState::new();
        state.add_message(plain_message("m1", "x"), None);

        assert!(state.update_delivery_status("m1", DeliveryStatus::Delivered));
        // Backward transition rejected, status stays Delivered
        assert!(!state.update_delivery_status("m1", DeliveryStatus::Sent));
        assert_eq!(
            state.messages_in_scope(&Scope::Main)[0].delivery_status,
            DeliveryStatus::Delivered
        );
        // Unknown id ignored
        assert!(!state.update_delivery_status("nope", DeliveryStatus::Read));
    }

    #[test]
    fn test_append_streamed_content() {
        let mut state = ChatState::new();
        state.add_message(plain_message("m1", "[AI] "), None);
        assert!(state.append_to_message("m1", "hello"));
        assert!(state.append_to_message("m1", " there"));
        assert_eq!(state.message_content("m1"), Some("[AI] hello there"));
        assert!(!state.append_to_message("gone", "x"));
    }

    #[test]
    fn test_role_last_write_wins() {
        let mut state = ChatState::new();
        let p1 = PeerId::from("P1");
        assert!(state.apply_role_update(RoleUpdate {
            peer_id: p1.clone(),
            role: Role::Medic,
            timestamp: 2000,
        }));
        // Older update loses
        assert!(!state.apply_role_update(RoleUpdate {
            peer_id: p1.clone(),
            role: Role::Scout,
            timestamp: 1000,
        }));
        assert_eq!(state.role_of(&p1), Role::Medic);
        // Newer update wins
        assert!(state.apply_role_update(RoleUpdate {
            peer_id: p1.clone(),
            role: Role::Leader,
            timestamp: 3000,
        }));
        assert_eq!(state.role_of(&p1), Role::Leader);
    }

    #[test]
    fn test_clear_scope_is_isolated() {
        let mut state = ChatState::new();
        state.add_message(plain_message("m1", "main"), None);
        let mut channel_msg = plain_message("m2", "channel");
        channel_msg.channel = Some("rescue".into());
        state.add_message(channel_msg, None);

        state.clear_scope(&Scope::Main);
        assert!(state.messages_in_scope(&Scope::Main).is_empty());
        assert_eq!(
            state
                .messages_in_scope(&Scope::Channel("rescue".into()))
                .len(),
            1
        );
    }

    #[test]
    fn test_recent_messages_skips_system_notices() {
        let mut state = ChatState::new();
        state.add_message(plain_message("m1", "one"), None);
        state.add_system_message("P1 connected", &Scope::Main);
        state.add_message(plain_message("m2", "two"), None);

        let recent = state.recent_messages(&Scope::Main, 5);
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
