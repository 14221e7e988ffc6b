pub mod assemble;
pub mod audio;
pub mod config;
pub mod error;
pub mod interactive;
pub mod notify;
pub mod pipeline;
mod process;
pub mod repair;
pub mod separate;
pub mod upscale;
pub mod worker;

pub use config::{Config, OutputFormat};
pub use error::{AudioliftError, Result};
pub use notify::{ChannelSink, EventSink, Notification, TracingSink};
pub use pipeline::{
    print_summary, run_upscale, CancelToken, ChunkOutcome, ChunkResult, PipelineRun,
    PipelineStats, RunReport, RunStatus, Session, UpscaleJob,
};
pub use repair::repair_media;
pub use separate::{run_separation, SeparationOutcome};
pub use worker::spawn_upscale;
