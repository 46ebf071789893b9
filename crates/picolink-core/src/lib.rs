//! picolink core - shared domain types
//!
//! This crate holds the I/O-free pieces of the link manager: the reconnect
//! policy, the retry state machine, the trailing write window, endpoint and
//! process identity, and the static indicator/command descriptors.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod endpoint;
pub mod error;
pub mod indicator;
pub mod lifecycle;
pub mod policy;
pub mod process;
pub mod window;

// Re-exports for convenience
pub use endpoint::{Endpoint, PortRange, DEFAULT_HOST};
pub use error::{DomainError, DomainResult};
pub use indicator::{CommandSpec, IndicatorSpec, LIST_COMMANDS, LIST_COMMANDS_COMMAND, STATUS, STOP};
pub use lifecycle::{FailureReason, Phase, ReconnectState, RetryMachine, Step};
pub use policy::{ReconnectPolicy, EXHAUSTED_MESSAGE};
pub use process::{ProcessId, SpawnSpec, DEFAULT_PROCESS_NAME};
pub use window::{WriteWindow, WRITE_WINDOW_CAPACITY};
