//! Background execution of pipeline runs.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::error;

use crate::notify::EventSink;
use crate::pipeline::{
    run_upscale, CancelToken, PipelineStats, RunReport, RunStatus, Session, UpscaleJob,
};

/// Run `job` on a dedicated worker thread.
///
/// The caller's thread is never blocked; all results arrive through `sink`.
pub fn spawn_upscale(
    session: Session,
    job: UpscaleJob,
    sink: Arc<dyn EventSink>,
    cancel: CancelToken,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("audiolift-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start worker runtime: {e}");
                    sink.on_complete(&RunReport {
                        status: RunStatus::Failed,
                        input: job.input.clone(),
                        output: job.output_path(),
                        total_chunks: 0,
                        outcomes: Vec::new(),
                        error: Some(format!("Failed to start worker runtime: {e}")),
                        stats: PipelineStats::default(),
                    });
                    return;
                }
            };

            runtime.block_on(run_upscale(&session, &job, sink.as_ref(), &cancel));
        })
}
