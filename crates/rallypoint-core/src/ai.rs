//! AI response trigger and the inference collaborator seam.
//!
//! The core treats the on-device model runtime purely as a streaming text
//! generator behind [`AiEngine`]. Eligibility of an inbound message is a
//! pure predicate evaluated on the engine task; the request itself runs on
//! its own worker and reports back through the engine queue, so chat state
//! is only ever touched from the serialized event loop.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use rallypoint_shared::constants::{AI_CONTEXT_MESSAGES, AI_REPLY_MARKER, COMMAND_PREFIX};
use rallypoint_shared::error::AiError;
use rallypoint_shared::types::{Message, PeerId, Role, Scope};

use crate::state::ChatState;

/// What a model must support to be considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCapability {
    Text,
    Vision,
}

/// Reference to a model known to the inference runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub id: String,
    pub name: String,
}

/// One streamed piece of an inference result.
#[derive(Debug, Clone)]
pub struct InferenceChunk {
    pub text: String,
    pub done: bool,
}

/// The on-device inference collaborator.
///
/// All methods are non-blocking; long-running work reports back through
/// the provided channels. The core triggers initialization when needed but
/// does not otherwise manage model lifecycle.
pub trait AiEngine: Send + Sync {
    fn list_models(&self, capability: ModelCapability) -> Vec<ModelRef>;
    fn is_downloaded(&self, model: &ModelRef) -> bool;
    fn initialize(&self, model: &ModelRef, done: oneshot::Sender<Result<(), AiError>>);
    fn run_inference(&self, model: &ModelRef, prompt: String, chunks: mpsc::Sender<InferenceChunk>);
}

/// Progress of an in-flight AI request, fed back into the engine queue.
#[derive(Debug)]
pub struct AiOutcome {
    /// Id of the placeholder message the reply streams into.
    pub message_id: String,
    /// Scope the triggering message arrived on.
    pub scope: Scope,
    pub event: AiEvent,
}

#[derive(Debug)]
pub enum AiEvent {
    Chunk { text: String, done: bool },
    Failed(AiError),
}

/// Phrases the responder refuses to reply to. The AI's own error and
/// frustration output can be relayed back into the channel by other peers;
/// answering it again would loop. Heuristic, not a correctness guarantee.
pub const LOOP_GUARD_KEYWORDS: &[&str] = &[
    "inference failed",
    "model error",
    "i give up",
    "cannot respond right now",
];

/// Whether an inbound message may trigger an automatic reply.
///
/// Every clause must hold: auto-respond on, public scope, foreign sender,
/// human-authored, not already an AI reply, not a command, and clear of
/// the loop-guard denylist.
pub fn is_eligible(message: &Message, state: &ChatState, local_peer: &PeerId) -> bool {
    if !state.auto_respond || message.is_private || message.is_system {
        return false;
    }
    if message.sender_peer_id.as_ref() == Some(local_peer) {
        return false;
    }
    if message.content.starts_with(AI_REPLY_MARKER) {
        return false;
    }
    if message.content.starts_with(COMMAND_PREFIX) {
        return false;
    }
    let lowered = message.content.to_lowercase();
    if LOOP_GUARD_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        debug!(id = %message.id, "Loop-guard keyword match, not replying");
        return false;
    }
    true
}

/// Build a role- and context-aware prompt for the given scope.
pub fn build_prompt(
    state: &ChatState,
    scope: &Scope,
    instruction: &str,
    local_peer: &PeerId,
    sender_peer: Option<&PeerId>,
) -> String {
    let mut prompt = String::from(
        "You assist an off-grid coordination group chatting over a mesh radio. \
         Be brief and concrete.\n",
    );
    let local_role = state.role_of(local_peer);
    if local_role != Role::Unassigned {
        prompt.push_str(&format!("This device's operator role: {local_role}.\n"));
    }
    if let Some(peer) = sender_peer {
        let role = state.role_of(peer);
        if role != Role::Unassigned {
            prompt.push_str(&format!("The person asking is a {role}.\n"));
        }
    }

    let recent = state.recent_messages(scope, AI_CONTEXT_MESSAGES);
    if !recent.is_empty() {
        prompt.push_str("Recent messages:\n");
        for message in recent {
            prompt.push_str(&format!("{}: {}\n", message.sender, message.content));
        }
    }
    prompt.push_str(&format!("Respond to: {instruction}\n"));
    prompt
}

/// Owns the inference collaborator and runs requests on their own worker.
pub struct AiResponder {
    engine: Arc<dyn AiEngine>,
    /// Id of the model already initialized, if any.
    ready: Mutex<Option<String>>,
}

impl AiResponder {
    pub fn new(engine: Arc<dyn AiEngine>) -> Self {
        Self {
            engine,
            ready: Mutex::new(None),
        }
    }

    /// Start an inference request for the placeholder message `message_id`.
    ///
    /// Non-blocking: the request runs on a spawned worker and reports every
    /// partial and the terminal outcome through `feedback`. There is no
    /// cancellation and no retry; a stalled stream simply never finishes.
    pub fn spawn_request(
        self: Arc<Self>,
        message_id: String,
        scope: Scope,
        prompt: String,
        feedback: mpsc::Sender<AiOutcome>,
    ) {
        tokio::spawn(async move {
            let event = match self.stream_reply(&prompt, &message_id, &scope, &feedback).await {
                Ok(()) => return,
                Err(error) => {
                    warn!(id = %message_id, %error, "AI request failed");
                    AiEvent::Failed(error)
                }
            };
            let _ = feedback
                .send(AiOutcome {
                    message_id,
                    scope,
                    event,
                })
                .await;
        });
    }

    async fn stream_reply(
        &self,
        prompt: &str,
        message_id: &str,
        scope: &Scope,
        feedback: &mpsc::Sender<AiOutcome>,
    ) -> Result<(), AiError> {
        let model = self.ensure_model().await?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<InferenceChunk>(32);
        self.engine.run_inference(&model, prompt.to_string(), chunk_tx);

        while let Some(chunk) = chunk_rx.recv().await {
            let done = chunk.done;
            let sent = feedback
                .send(AiOutcome {
                    message_id: message_id.to_string(),
                    scope: scope.clone(),
                    event: AiEvent::Chunk {
                        text: chunk.text,
                        done,
                    },
                })
                .await;
            if sent.is_err() || done {
                break;
            }
        }
        // A stream that ends without a done chunk leaves the placeholder
        // in its last state; accepted limitation, not rolled back.
        Ok(())
    }

    /// Pick the first text-capable model and make sure it is initialized.
    async fn ensure_model(&self) -> Result<ModelRef, AiError> {
        let model = self
            .engine
            .list_models(ModelCapability::Text)
            .into_iter()
            .next()
            .ok_or(AiError::NoModelAvailable)?;
        if !self.engine.is_downloaded(&model) {
            return Err(AiError::ModelNotDownloaded(model.name.clone()));
        }

        let mut ready = self.ready.lock().await;
        if ready.as_deref() != Some(model.id.as_str()) {
            let (done_tx, done_rx) = oneshot::channel();
            self.engine.initialize(&model, done_tx);
            done_rx
                .await
                .map_err(|_| AiError::InitializationFailed("runtime dropped".into()))??;
            *ready = Some(model.id.clone());
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rallypoint_shared::types::DeliveryStatus;

    fn inbound(content: &str, sender_peer: &str) -> Message {
        Message {
            id: "m1".into(),
            sender: "ana".into(),
            sender_peer_id: Some(PeerId::from(sender_peer)),
            content: content.to_string(),
            timestamp: Utc::now(),
            channel: None,
            is_private: false,
            is_system: false,
            delivery_status: DeliveryStatus::Delivered,
        }
    }

    fn responding_state() -> ChatState {
        let mut state = ChatState::new();
        state.auto_respond = true;
        state
    }

    #[test]
    fn test_eligible_public_message() {
        let state = responding_state();
        let local = PeerId::from("LOCAL");
        assert!(is_eligible(&inbound("need a route north", "P1"), &state, &local));
    }

    #[test]
    fn test_ineligible_when_auto_respond_off() {
        let state = ChatState::new();
        let local = PeerId::from("LOCAL");
        assert!(!is_eligible(&inbound("need a route north", "P1"), &state, &local));
    }

    #[test]
    fn test_ineligible_own_private_and_system_messages() {
        let state = responding_state();
        let local = PeerId::from("LOCAL");

        assert!(!is_eligible(&inbound("hi", "LOCAL"), &state, &local));

        let mut private = inbound("hi", "P1");
        private.is_private = true;
        assert!(!is_eligible(&private, &state, &local));

        let mut system = inbound("P1 connected", "P1");
        system.is_system = true;
        assert!(!is_eligible(&system, &state, &local));
    }

    #[test]
    fn test_ai_marker_never_retriggers() {
        let state = responding_state();
        let local = PeerId::from("LOCAL");
        let relayed = inbound(&format!("{AI_REPLY_MARKER}hello"), "P1");
        assert!(!is_eligible(&relayed, &state, &local));
    }

    #[test]
    fn test_commands_and_loop_guard_keywords_skipped() {
        let state = responding_state();
        let local = PeerId::from("LOCAL");
        assert!(!is_eligible(&inbound("/who", "P1"), &state, &local));
        assert!(!is_eligible(
            &inbound("ugh, Inference FAILED again", "P1"),
            &state,
            &local
        ));
    }

    #[test]
    fn test_prompt_carries_roles_and_context() {
        let mut state = responding_state();
        let local = PeerId::from("LOCAL");
        let sender = PeerId::from("P1");
        state.apply_role_update(rallypoint_shared::protocol::RoleUpdate {
            peer_id: local.clone(),
            role: Role::Analyst,
            timestamp: 1,
        });
        state.apply_role_update(rallypoint_shared::protocol::RoleUpdate {
            peer_id: sender.clone(),
            role: Role::Scout,
            timestamp: 1,
        });
        state.add_message(inbound("bridge is out", "P1"), None);

        let prompt = build_prompt(&state, &Scope::Main, "find another way", &local, Some(&sender));
        assert!(prompt.contains("analyst"));
        assert!(prompt.contains("scout"));
        assert!(prompt.contains("ana: bridge is out"));
        assert!(prompt.contains("Respond to: find another way"));
    }

    // --- Responder streaming ---

    struct FakeEngine {
        models: Vec<ModelRef>,
        downloaded: bool,
        chunks: Vec<InferenceChunk>,
    }

    impl AiEngine for FakeEngine {
        fn list_models(&self, _capability: ModelCapability) -> Vec<ModelRef> {
            self.models.clone()
        }

        fn is_downloaded(&self, _model: &ModelRef) -> bool {
            self.downloaded
        }

        fn initialize(&self, _model: &ModelRef, done: oneshot::Sender<Result<(), AiError>>) {
            let _ = done.send(Ok(()));
        }

        fn run_inference(
            &self,
            _model: &ModelRef,
            _prompt: String,
            chunks: mpsc::Sender<InferenceChunk>,
        ) {
            let out = self.chunks.clone();
            tokio::spawn(async move {
                for chunk in out {
                    if chunks.send(chunk).await.is_err() {
                        break;
                    }
                }
            });
        }
    }

    fn fake_model() -> ModelRef {
        ModelRef {
            id: "tiny".into(),
            name: "tiny-chat".into(),
        }
    }

    #[tokio::test]
    async fn test_request_streams_chunks_until_done() {
        let engine = Arc::new(FakeEngine {
            models: vec![fake_model()],
            downloaded: true,
            chunks: vec![
                InferenceChunk {
                    text: "head ".into(),
                    done: false,
                },
                InferenceChunk {
                    text: "north".into(),
                    done: true,
                },
            ],
        });
        let responder = Arc::new(AiResponder::new(engine));
        let (tx, mut rx) = mpsc::channel(8);
        responder.spawn_request("m1".into(), Scope::Main, "route?".into(), tx);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, AiEvent::Chunk { ref text, done: false } if text == "head "));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, AiEvent::Chunk { ref text, done: true } if text == "north"));
        assert_eq!(second.message_id, "m1");
    }

    #[tokio::test]
    async fn test_request_fails_without_model() {
        let engine = Arc::new(FakeEngine {
            models: vec![],
            downloaded: false,
            chunks: vec![],
        });
        let responder = Arc::new(AiResponder::new(engine));
        let (tx, mut rx) = mpsc::channel(8);
        responder.spawn_request("m1".into(), Scope::Main, "route?".into(), tx);

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(
            outcome.event,
            AiEvent::Failed(AiError::NoModelAvailable)
        ));
    }

    #[tokio::test]
    async fn test_request_fails_when_model_not_downloaded() {
        let engine = Arc::new(FakeEngine {
            models: vec![fake_model()],
            downloaded: false,
            chunks: vec![],
        });
        let responder = Arc::new(AiResponder::new(engine));
        let (tx, mut rx) = mpsc::channel(8);
        responder.spawn_request("m1".into(), Scope::Main, "route?".into(), tx);

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(
            outcome.event,
            AiEvent::Failed(AiError::ModelNotDownloaded(_))
        ));
    }
}
