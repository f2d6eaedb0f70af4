pub mod common;
pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;

pub use config::{Configuration, WireFormat};
pub use error::{ClassifyError, PipelineError};

pub use pipeline::{LifecycleController, PipelineBuilder, PipelineSnapshot, PipelineState};
