//! Rallypoint core: event processing and command protocol for an offline
//! mesh group-coordination chat.
//!
//! Sits between the mesh transport and the on-device AI runtime, both of
//! which are external collaborators behind narrow traits. The core owns
//! deduplication of redundantly delivered events, the slash-command
//! language, the text-embedded coordination protocol (roles, supply
//! requests, emergency alerts), and the policy for automatic AI replies
//! including loop prevention. One serialized engine task performs all
//! state mutation; see [`engine::spawn_engine`].

pub mod ai;
pub mod commands;
pub mod dedup;
pub mod engine;
pub mod router;
pub mod state;
pub mod transport;

pub use ai::{AiEngine, AiResponder, InferenceChunk, ModelCapability, ModelRef};
pub use commands::{CommandDispatcher, CommandSpec};
pub use dedup::EventDeduplicator;
pub use engine::{spawn_engine, submit, EngineCommand, EngineConfig};
pub use router::EventRouter;
pub use state::{ChatState, StateSnapshot};
pub use transport::{InboundEvent, Transport};
