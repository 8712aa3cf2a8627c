//! Inbound event routing.
//!
//! Single entry point for everything the transport delivers. Each event
//! passes the dedup gate, then either mutates the peer roster, updates a
//! delivery status, or lands in a message list, with embedded protocol
//! payloads peeled off on the way. Plain public messages are finally
//! offered to the AI responder.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rallypoint_shared::constants::AI_REPLY_MARKER;
use rallypoint_shared::error::ProtocolError;
use rallypoint_shared::protocol::{self, EmergencyAlert, Payload, SupplyRequest};
use rallypoint_shared::types::{DeliveryStatus, Message, PeerId, Scope};

use crate::ai::{self, AiEvent, AiOutcome, AiResponder};
use crate::dedup::EventDeduplicator;
use crate::state::ChatState;
use crate::transport::{InboundEvent, Transport};

/// Routes inbound transport events into the chat state and decides when
/// the AI responder fires. Owned by the engine task; never shared.
pub struct EventRouter {
    state: ChatState,
    dedup: EventDeduplicator,
    responder: Arc<AiResponder>,
    transport: Arc<dyn Transport>,
    /// Where the responder's worker reports partials and failures.
    feedback: mpsc::Sender<AiOutcome>,
    local_peer: PeerId,
    local_nickname: String,
}

impl EventRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        responder: Arc<AiResponder>,
        feedback: mpsc::Sender<AiOutcome>,
        local_peer: PeerId,
        local_nickname: &str,
    ) -> Self {
        Self {
            state: ChatState::new(),
            dedup: EventDeduplicator::new(),
            responder,
            transport,
            feedback,
            local_peer,
            local_nickname: local_nickname.to_string(),
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChatState {
        &mut self.state
    }

    /// Process one inbound transport event exactly once.
    pub fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::MessageReceived(message) => self.on_message(message),
            InboundEvent::PeerConnected(peer) => self.on_connection(peer, true),
            InboundEvent::PeerDisconnected(peer) => self.on_connection(peer, false),
            InboundEvent::DeliveryAck { message_id, recipient, .. } => {
                if !self
                    .state
                    .update_delivery_status(&message_id, DeliveryStatus::Delivered)
                {
                    debug!(id = %message_id, peer = %recipient, "Ack for unknown or settled message");
                }
            }
            InboundEvent::ReadReceipt { message_id, reader, .. } => {
                if !self
                    .state
                    .update_delivery_status(&message_id, DeliveryStatus::Read)
                {
                    debug!(id = %message_id, peer = %reader, "Receipt for unknown or settled message");
                }
            }
        }
    }

    fn on_connection(&mut self, peer: PeerId, connected: bool) {
        let key = self.dedup.connection_key(connected, &peer);
        if !self.dedup.should_process(&key) {
            debug!(peer = %peer, connected, "Duplicate connection event dropped");
            return;
        }
        let changed = if connected {
            self.state.peer_connected(peer.clone())
        } else {
            self.state.peer_disconnected(&peer)
        };
        if !changed {
            return;
        }
        let display = self
            .state
            .nickname_of(&peer)
            .unwrap_or_else(|| peer.short())
            .to_string();
        let verb = if connected { "connected" } else { "disconnected" };
        info!(peer = %peer, verb, "Peer roster changed");
        self.state
            .add_system_message(&format!("{display} {verb}"), &Scope::Main);
    }

    fn on_message(&mut self, message: Message) {
        let sender_id = message
            .sender_peer_id
            .clone()
            .unwrap_or_else(|| PeerId::from(message.sender.as_str()));

        let key = self.dedup.message_key(sender_id.as_str(), &message.content);
        if !self.dedup.should_process(&key) {
            debug!(id = %message.id, "Duplicate message dropped");
            return;
        }

        self.state.note_nickname(&sender_id, &message.sender);
        if self.state.is_blocked(&sender_id) {
            debug!(peer = %sender_id, "Message from blocked peer dropped");
            return;
        }

        match protocol::decode(&message.content, &sender_id) {
            Ok(Payload::RoleUpdate(update)) => {
                if self.state.apply_role_update(update.clone()) {
                    debug!(peer = %update.peer_id, role = %update.role, "Role updated");
                }
            }
            Ok(Payload::SupplyRequest(request)) => self.on_supply_request(request),
            Ok(Payload::EmergencyAlert(alert)) => self.on_emergency(alert),
            Ok(Payload::Plain) => self.on_plain_message(message, sender_id),
            Err(error @ ProtocolError::SpoofedSender { .. }) => {
                warn!(peer = %sender_id, %error, "Discarding protocol payload");
            }
            Err(error) => {
                warn!(peer = %sender_id, %error, "Dropping malformed protocol payload");
            }
        }
    }

    // Protocol payloads never enter visible history as their raw wire
    // text; supply requests and emergencies surface as system notices.
    fn on_supply_request(&mut self, request: SupplyRequest) {
        let display = self
            .state
            .nickname_of(&request.peer_id)
            .unwrap_or_else(|| request.peer_id.short())
            .to_string();
        self.state.add_system_message(
            &format!("{display} requests supplies: {}", request.item),
            &Scope::Main,
        );
    }

    fn on_emergency(&mut self, alert: EmergencyAlert) {
        warn!(peer = %alert.peer_id, role = %alert.role, message = %alert.message, "Emergency alert");
        let display = self
            .state
            .nickname_of(&alert.peer_id)
            .unwrap_or_else(|| alert.peer_id.short())
            .to_string();
        self.state.add_system_message(
            &format!("EMERGENCY from {display} ({}): {}", alert.role, alert.message),
            &Scope::Main,
        );
    }

    fn on_plain_message(&mut self, message: Message, sender_id: PeerId) {
        let trigger_candidate = (!message.is_private).then(|| message.clone());
        if message.is_private {
            self.state.add_message(message, Some(&sender_id));
        } else {
            self.state.add_message(message, None);
        }
        if let Some(candidate) = trigger_candidate {
            self.maybe_trigger_ai(&candidate, &sender_id);
        }
    }

    // --- AI responder integration ---

    fn maybe_trigger_ai(&mut self, message: &Message, sender_id: &PeerId) {
        if !ai::is_eligible(message, &self.state, &self.local_peer) {
            return;
        }
        let debounce = self.dedup.ai_trigger_key(&message.id);
        if !self.dedup.should_process(&debounce) {
            debug!(id = %message.id, "AI trigger debounced");
            return;
        }

        let scope = match &message.channel {
            Some(channel) => Scope::Channel(channel.clone()),
            None => Scope::Main,
        };
        let prompt = ai::build_prompt(
            &self.state,
            &scope,
            &message.content,
            &self.local_peer,
            Some(sender_id),
        );
        self.start_inference(scope, prompt);
    }

    /// Direct invocation path for the `/ai` command. No eligibility check;
    /// the user asked explicitly.
    pub fn request_ai(&mut self, prompt_text: &str) {
        let scope = self.state.active_scope.clone();
        let prompt = ai::build_prompt(&self.state, &scope, prompt_text, &self.local_peer, None);
        self.start_inference(scope, prompt);
    }

    fn start_inference(&mut self, scope: Scope, prompt: String) {
        // Peers see activity before the (possibly slow) inference lands.
        self.transport.send(
            &format!("{AI_REPLY_MARKER}processing..."),
            &[],
            scope.wire_scope().as_deref(),
        );

        let placeholder = Message::outgoing("AI", self.local_peer.clone(), AI_REPLY_MARKER, &scope);
        let placeholder_id = placeholder.id.clone();
        let counterparty = match &scope {
            Scope::Private(peer) => Some(peer.clone()),
            _ => None,
        };
        self.state.add_message(placeholder, counterparty.as_ref());

        self.responder
            .clone()
            .spawn_request(placeholder_id, scope, prompt, self.feedback.clone());
    }

    /// Apply a partial or terminal AI outcome reported by the worker.
    pub fn handle_ai_outcome(&mut self, outcome: AiOutcome) {
        match outcome.event {
            AiEvent::Chunk { text, done } => {
                if !self.state.append_to_message(&outcome.message_id, &text) {
                    debug!(id = %outcome.message_id, "AI chunk for missing placeholder");
                    return;
                }
                if done {
                    let final_text = self
                        .state
                        .message_content(&outcome.message_id)
                        .map(str::to_string);
                    if let Some(text) = final_text {
                        self.state
                            .update_delivery_status(&outcome.message_id, DeliveryStatus::Sent);
                        self.transport
                            .send(&text, &[], outcome.scope.wire_scope().as_deref());
                    }
                }
            }
            AiEvent::Failed(error) => {
                self.state.add_system_message(
                    &format!("AI reply unavailable: {error}. {}", error.remediation()),
                    &outcome.scope,
                );
            }
        }
    }

    /// Send one line of plain chat into the active scope.
    pub fn send_chat(&mut self, line: &str) {
        let scope = self.state.active_scope.clone();
        let message = Message::outgoing(&self.local_nickname, self.local_peer.clone(), line, &scope);
        let mentions: Vec<String> = match &scope {
            Scope::Private(peer) => self
                .state
                .nickname_of(peer)
                .map(|nick| vec![nick.to_string()])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let counterparty = match &scope {
            Scope::Private(peer) => Some(peer.clone()),
            _ => None,
        };
        self.state.add_message(message, counterparty.as_ref());
        self.transport
            .send(line, &mentions, scope.wire_scope().as_deref());
    }

    /// Periodic maintenance driven by the engine loop.
    pub fn sweep(&mut self) {
        self.dedup.sweep();
    }
}
