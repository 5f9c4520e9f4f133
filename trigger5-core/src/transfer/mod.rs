//! Frame delivery over the bulk endpoint.

pub mod buffer;
pub mod pipeline;
pub mod signal;

pub use buffer::TransferBuffer;
pub use pipeline::{
    DEFAULT_COMPLETION_WAIT, DEFAULT_DEADLINE, PipelineConfig, PipelineStats, TransferHandle,
    TransferPipeline,
};
pub use signal::{CompletionSignal, SlotPhase, TransferStatus};
