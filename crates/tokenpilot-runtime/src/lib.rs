#![deny(missing_docs)]
//! Tokenpilot runtime.
//!
//! Transport-agnostic orchestration: progress relay, answer delivery, the
//! conversation pipeline and the process lifecycle.

/// Answer delivery with a tagged outcome.
pub mod delivery;
/// Process start/stop.
pub mod lifecycle;
/// Update handling control flow.
pub mod pipeline;
/// Stage-driven progress placeholder.
pub mod relay;
/// Outbound messaging trait.
pub mod transport;

#[cfg(test)]
mod testing;

pub use delivery::{deliver, DeliveryOutcome};
pub use lifecycle::{Lifecycle, StopSignal};
pub use pipeline::{ConversationPipeline, PipelineError, PipelineOptions};
pub use relay::{ProgressRelay, RelayOutcome};
pub use transport::{ChatTransport, MessageRef, TransportError};
