//! Scheduler module for rill: pipeline dataflow.
//!
//! Each form in a pipeline runs as its own tokio task. Adjacent stages are
//! joined by a pair of conduits, one for bytes and one for values:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        PipelineRunner                         │
//! │  ┌────────┐  byte pipe   ┌────────┐  byte pipe   ┌────────┐   │
//! │  │ form 1 │─────────────▶│ form 2 │─────────────▶│ form 3 │   │
//! │  │ (task) │─────────────▶│ (task) │─────────────▶│ (task) │   │
//! │  └────────┘ value chan   └────────┘ value chan   └────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A stage's outgoing conduits close when the stage finishes.

mod pipe_stream;
mod pipeline;
mod ports;

pub use pipe_stream::{PIPE_BUFFER_SIZE, PipeReader, PipeWriter, pipe_stream};
pub use pipeline::PipelineRunner;
pub use ports::{ByteIn, ByteOut, Ports, ValueIn, ValueOut};

/// Default capacity of a value conduit.
pub const VALUE_CHAN_SIZE: usize = 32;

/// Sizing of the conduits created between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    pub value_chan_size: usize,
    pub pipe_buffer_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            value_chan_size: VALUE_CHAN_SIZE,
            pipe_buffer_size: PIPE_BUFFER_SIZE,
        }
    }
}
