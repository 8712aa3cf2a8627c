//! Engine event loop with the tokio mpsc command pattern.
//!
//! All chat-state mutation is serialized onto one spawned task. Transport
//! callbacks, user input, and the AI worker's progress reports are just
//! producers into the same queue, so dedup-check-then-insert and role
//! read-then-write are atomic with respect to each other without any
//! field-level locking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use rallypoint_shared::constants::APP_NAME;
use rallypoint_shared::types::{PeerId, Scope};

use crate::ai::{AiEngine, AiOutcome, AiResponder};
use crate::commands::{CommandDispatcher, CommandSpec};
use crate::router::EventRouter;
use crate::state::StateSnapshot;
use crate::transport::{InboundEvent, Transport};

/// Commands sent *into* the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// An inbound transport event (fed by the transport's callbacks).
    Inbound(InboundEvent),
    /// One line of local user input: a slash command or plain chat.
    UserInput(String),
    /// Change the scope user input and `/clear` act on.
    SetActiveScope(Scope),
    /// Request a snapshot of the current state.
    GetSnapshot(oneshot::Sender<StateSnapshot>),
    /// Autocomplete suggestions for a partial input line.
    Suggest {
        partial: String,
        reply: oneshot::Sender<Vec<CommandSpec>>,
    },
    /// Gracefully shut down the engine.
    Shutdown,
}

/// Configuration for spawning the engine.
pub struct EngineConfig {
    /// Transport-stable identity of this device.
    pub local_peer: PeerId,
    /// Nickname other peers see.
    pub nickname: String,
    /// How often the dedup cache is swept.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_peer: PeerId::from("local"),
            nickname: "anonymous".to_string(),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Spawn the engine loop in a background tokio task.
///
/// Returns the command channel and the task handle. The loop exits on
/// [`EngineCommand::Shutdown`] or when all command senders are dropped.
pub fn spawn_engine(
    transport: Arc<dyn Transport>,
    ai_engine: Arc<dyn AiEngine>,
    config: EngineConfig,
) -> (mpsc::Sender<EngineCommand>, JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<EngineCommand>(256);
    let (ai_tx, mut ai_rx) = mpsc::channel::<AiOutcome>(64);

    let responder = Arc::new(AiResponder::new(ai_engine));
    let dispatcher = CommandDispatcher::new(config.local_peer.clone(), &config.nickname);
    let mut router = EventRouter::new(
        transport.clone(),
        responder,
        ai_tx,
        config.local_peer.clone(),
        &config.nickname,
    );

    info!(
        app = APP_NAME,
        peer = %config.local_peer,
        nickname = %config.nickname,
        "Engine starting"
    );

    let handle = tokio::spawn(async move {
        let mut sweep = tokio::time::interval(config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // --- Commands from transport callbacks and the UI ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Inbound(event)) => {
                            router.handle_event(event);
                        }
                        Some(EngineCommand::UserInput(line)) => {
                            let outcome = dispatcher.dispatch(router.state_mut(), &line);
                            if outcome.handled {
                                for out in &outcome.outbound {
                                    transport.send(&out.text, &out.mentions, out.scope.as_deref());
                                }
                                if let Some(prompt) = outcome.ai_prompt {
                                    router.request_ai(&prompt);
                                }
                            } else if !line.trim().is_empty() {
                                router.send_chat(line.trim());
                            }
                        }
                        Some(EngineCommand::SetActiveScope(scope)) => {
                            router.state_mut().active_scope = scope;
                        }
                        Some(EngineCommand::GetSnapshot(reply)) => {
                            let _ = reply.send(router.state().snapshot());
                        }
                        Some(EngineCommand::Suggest { partial, reply }) => {
                            let suggestions = dispatcher
                                .suggest(router.state(), &partial)
                                .into_iter()
                                .cloned()
                                .collect();
                            let _ = reply.send(suggestions);
                        }
                        Some(EngineCommand::Shutdown) => {
                            info!("Engine shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down engine");
                            break;
                        }
                    }
                }

                // --- Progress from the AI worker ---
                Some(outcome) = ai_rx.recv() => {
                    router.handle_ai_outcome(outcome);
                }

                // --- Periodic maintenance ---
                _ = sweep.tick() => {
                    router.sweep();
                }
            }
        }

        info!("Engine loop terminated");
    });

    (cmd_tx, handle)
}

/// Send a command to the engine task, failing if it has shut down.
pub async fn submit(
    cmd_tx: &mpsc::Sender<EngineCommand>,
    command: EngineCommand,
) -> anyhow::Result<()> {
    cmd_tx
        .send(command)
        .await
        .map_err(|_| anyhow::anyhow!("Engine command channel closed"))
}
