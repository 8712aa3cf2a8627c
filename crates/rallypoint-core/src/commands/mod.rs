pub mod dispatch;
pub mod registry;

pub use dispatch::{CommandDispatcher, DispatchOutcome, Outbound};
pub use registry::{suggest, CommandSpec};
