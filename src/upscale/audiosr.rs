//! AudioSR diffusion-based super-resolution, run in a long-lived Python worker.
//!
//! The worker loads the model once, then answers one JSON request per line on
//! stdin with one JSON reply per line on stdout. Samples travel through a raw
//! little-endian `f32` side file next to the staged chunk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::remove_staged_file;
use crate::error::{AudioliftError, Result};
use crate::process::collaborator_command;

use super::{SuperResolver, TARGET_SAMPLE_RATE};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const STDERR_TAIL_LINES: usize = 20;

/// argv: model name, DDIM steps, guidance scale.
const WORKER_SCRIPT: &str = r#"
import sys
import os
import json

os.environ['TF_CPP_MIN_LOG_LEVEL'] = '3'

# stdout carries the protocol; library chatter goes to stderr
protocol = sys.stdout
sys.stdout = sys.stderr

def reply(message):
    protocol.write(json.dumps(message) + "\n")
    protocol.flush()

try:
    import numpy as np
    import torch
    from audiosr import build_model, super_resolution
except ImportError as e:
    print(f"Missing dependency: {e}", file=sys.stderr)
    sys.exit(1)

model_name = sys.argv[1]
ddim_steps = int(sys.argv[2])
guidance_scale = float(sys.argv[3])

if torch.backends.mps.is_available():
    device = "mps"
elif torch.cuda.is_available():
    device = "cuda"
else:
    device = "cpu"

print(f"Using device: {device}", file=sys.stderr)

try:
    model = build_model(model_name=model_name, device=device)
except Exception as e:
    print(f"Failed to build model: {e}", file=sys.stderr)
    sys.exit(2)

reply({"ready": True})

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    request = json.loads(line)

    try:
        waveform = super_resolution(
            model,
            request["input"],
            ddim_steps=ddim_steps,
            guidance_scale=guidance_scale,
        )
    except Exception as e:
        reply({"stage": "inference", "error": str(e)})
        continue

    try:
        if hasattr(waveform, "detach"):
            waveform = waveform.detach().cpu().numpy()
        waveform = np.ascontiguousarray(waveform, dtype="<f4")
        waveform.tofile(request["output"])
        reply({"shape": list(waveform.shape), "sample_rate": 48000})
    except Exception as e:
        reply({"stage": "save", "error": str(e)})
"#;

#[derive(Debug, Serialize)]
struct ChunkRequest<'a> {
    input: &'a Path,
    output: &'a Path,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum WorkerReply {
    Ready { ready: bool },
    Output { shape: Vec<usize>, sample_rate: u32 },
    Failed { stage: String, error: String },
}

fn chunk_request(input: &Path, output: &Path) -> Result<String> {
    Ok(serde_json::to_string(&ChunkRequest { input, output })?)
}

fn parse_reply(line: &str) -> Option<WorkerReply> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

fn exit_message(code: Option<i32>, stderr: &str) -> String {
    match code {
        Some(1) => "Missing Python dependencies (torch, numpy, audiosr)".to_string(),
        Some(2) => format!("Failed to build AudioSR model: {stderr}"),
        Some(code) => format!("AudioSR worker exited with status {code}: {stderr}"),
        None => format!("AudioSR worker was terminated: {stderr}"),
    }
}

fn stage_message(stage: &str, error: &str) -> String {
    match stage {
        "inference" => format!("AudioSR inference failed: {error}"),
        "save" => format!("Failed to save AudioSR output: {error}"),
        other => format!("AudioSR failed during {other}: {error}"),
    }
}

fn decode_raw(bytes: &[u8], shape: &[usize]) -> Result<ArrayD<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AudioliftError::DecodeFailed(format!(
            "AudioSR output has {} bytes, not a whole number of f32 samples",
            bytes.len()
        )));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    ArrayD::from_shape_vec(IxDyn(shape), samples).map_err(|e| {
        AudioliftError::DecodeFailed(format!("AudioSR output does not match shape {shape:?}: {e}"))
    })
}

async fn forward_stderr(stderr: ChildStderr, tail: Arc<StdMutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("AudioSR: {}", line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

/// One running interpreter with the model loaded.
struct AudioSrWorker {
    child: Child,
    stdin: ChildStdin,
    replies: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<()>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
}

impl AudioSrWorker {
    /// Next protocol reply, or `None` once the worker's stdout is closed.
    async fn next_reply(&mut self) -> Option<WorkerReply> {
        loop {
            match self.replies.next_line().await {
                Ok(Some(line)) => match parse_reply(&line) {
                    Some(reply) => return Some(reply),
                    None => debug!("AudioSR stdout: {}", line),
                },
                Ok(None) => return None,
                Err(e) => {
                    debug!("Failed to read from AudioSR worker: {e}");
                    return None;
                }
            }
        }
    }

    async fn request(&mut self, line: &str) -> Option<WorkerReply> {
        let sent = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        }
        .await;

        if let Err(e) = sent {
            debug!("Failed to send request to AudioSR worker: {e}");
            return None;
        }
        self.next_reply().await
    }

    /// Close stdin and wait for the worker to exit, killing it after a grace period.
    async fn close(self) -> (Option<i32>, String) {
        let AudioSrWorker {
            mut child,
            stdin,
            stderr_task,
            stderr_tail,
            ..
        } = self;
        drop(stdin);

        let code = match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                warn!("Failed to wait for AudioSR worker: {e}");
                None
            }
            Err(_) => {
                warn!("AudioSR worker did not exit, killing it");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill AudioSR worker: {e}");
                }
                None
            }
        };

        if let Err(e) = stderr_task.await {
            debug!("AudioSR stderr reader stopped: {e}");
        }
        let stderr = stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();

        (code, stderr.trim().to_string())
    }

    async fn into_error(self) -> AudioliftError {
        let (code, stderr) = self.close().await;
        AudioliftError::DecodeFailed(exit_message(code, &stderr))
    }
}

/// Runs `audiosr.super_resolution` over staged chunks in one worker process.
///
/// The worker starts on the first chunk and stays up until
/// [`SuperResolver::shutdown`].
pub struct AudioSrCommand {
    python_path: PathBuf,
    model_name: String,
    ddim_steps: u32,
    guidance_scale: f32,
    script: &'static str,
    worker: Mutex<Option<AudioSrWorker>>,
}

impl AudioSrCommand {
    pub fn new(python_path: impl Into<PathBuf>) -> Self {
        Self {
            python_path: python_path.into(),
            model_name: "basic".to_string(),
            ddim_steps: 50,
            guidance_scale: 3.5,
            script: WORKER_SCRIPT,
            worker: Mutex::new(None),
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_ddim_steps(mut self, steps: u32) -> Self {
        self.ddim_steps = steps;
        self
    }

    pub fn with_guidance_scale(mut self, scale: f32) -> Self {
        self.guidance_scale = scale;
        self
    }

    #[cfg(test)]
    fn with_worker_script(mut self, script: &'static str) -> Self {
        self.script = script;
        self
    }

    async fn start_worker(&self) -> Result<AudioSrWorker> {
        info!(
            "Starting AudioSR worker (model={}, ddim_steps={}, guidance_scale={})",
            self.model_name, self.ddim_steps, self.guidance_scale
        );

        let mut command = collaborator_command(&self.python_path);
        command
            .arg("-c")
            .arg(self.script)
            .arg(&self.model_name)
            .arg(self.ddim_steps.to_string())
            .arg(self.guidance_scale.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            AudioliftError::DecodeFailed(format!(
                "Failed to run {}: {e}",
                self.python_path.display()
            ))
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            return Err(AudioliftError::DecodeFailed(
                "AudioSR worker pipes were not captured".to_string(),
            ));
        };

        let stderr_tail = Arc::new(StdMutex::new(VecDeque::new()));
        let stderr_task = tokio::spawn(forward_stderr(stderr, stderr_tail.clone()));

        let mut worker = AudioSrWorker {
            child,
            stdin,
            replies: BufReader::new(stdout).lines(),
            stderr_task,
            stderr_tail,
        };

        match worker.next_reply().await {
            Some(WorkerReply::Ready { .. }) => {
                info!("AudioSR model loaded");
                Ok(worker)
            }
            Some(other) => {
                warn!("Unexpected AudioSR startup reply: {other:?}");
                Err(worker.into_error().await)
            }
            None => Err(worker.into_error().await),
        }
    }
}

#[async_trait]
impl SuperResolver for AudioSrCommand {
    async fn upsample(&self, staged_chunk: &Path, sample_rate: u32) -> Result<ArrayD<f32>> {
        info!(
            "Running AudioSR on {} ({} Hz)",
            staged_chunk.display(),
            sample_rate
        );

        let raw_output = staged_chunk.with_extension("sr.f32");
        let request = chunk_request(staged_chunk, &raw_output)?;

        let mut slot = self.worker.lock().await;
        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => self.start_worker().await?,
        };

        let Some(reply) = worker.request(&request).await else {
            remove_staged_file(&raw_output);
            return Err(worker.into_error().await);
        };
        *slot = Some(worker);
        drop(slot);

        match reply {
            WorkerReply::Output { shape, sample_rate } => {
                if sample_rate != TARGET_SAMPLE_RATE {
                    debug!(
                        "AudioSR reported {} Hz, expected {}",
                        sample_rate, TARGET_SAMPLE_RATE
                    );
                }
                let bytes = std::fs::read(&raw_output);
                remove_staged_file(&raw_output);
                decode_raw(&bytes?, &shape)
            }
            WorkerReply::Failed { stage, error } => {
                remove_staged_file(&raw_output);
                Err(AudioliftError::DecodeFailed(stage_message(&stage, &error)))
            }
            WorkerReply::Ready { .. } => Err(AudioliftError::DecodeFailed(
                "AudioSR worker sent an unexpected ready message".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "AudioSR"
    }

    async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            let (code, _) = worker.close().await;
            debug!("AudioSR worker stopped (status {:?})", code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Stands in for the interpreter: `$0` is the "model name", used here as
    /// a log of worker starts. Replies with two samples of 0.5 per chunk and
    /// fails any chunk whose path contains "bad".
    #[cfg(unix)]
    const FAKE_WORKER: &str = r#"
echo started >> "$0"
echo "loading fake model" >&2
echo '{"ready": true}'
while read -r line; do
  case "$line" in
    *bad*) echo '{"stage": "inference", "error": "corrupt chunk"}'; continue ;;
  esac
  out=$(printf '%s' "$line" | sed 's/.*"output":"\([^"]*\)".*/\1/')
  printf '\000\000\000\077\000\000\000\077' > "$out"
  echo '{"shape": [1, 1, 2], "sample_rate": 48000}'
done
"#;

    #[cfg(unix)]
    fn fake_command(dir: &TempDir, script: &'static str) -> (AudioSrCommand, PathBuf) {
        let starts = dir.path().join("starts.log");
        let command = AudioSrCommand::new("sh")
            .with_model(starts.display().to_string())
            .with_worker_script(script);
        (command, starts)
    }

    #[cfg(unix)]
    fn worker_starts(log: &Path) -> usize {
        std::fs::read_to_string(log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn test_parse_reply_variants() {
        assert_eq!(
            parse_reply("{\"ready\": true}"),
            Some(WorkerReply::Ready { ready: true })
        );
        assert_eq!(
            parse_reply("{\"shape\": [1, 1, 480], \"sample_rate\": 48000}"),
            Some(WorkerReply::Output {
                shape: vec![1, 1, 480],
                sample_rate: 48_000
            })
        );
        assert_eq!(
            parse_reply("{\"stage\": \"save\", \"error\": \"disk full\"}"),
            Some(WorkerReply::Failed {
                stage: "save".to_string(),
                error: "disk full".to_string()
            })
        );
        assert_eq!(parse_reply("DDIM Sampler: 100%"), None);
    }

    #[test]
    fn test_chunk_request_escapes_unusual_paths() {
        let input = Path::new("/tmp/we\"ird\u{200b}dir/chunk_000.wav");
        let output = Path::new("/tmp/we\"ird\u{200b}dir/chunk_000.sr.f32");

        let line = chunk_request(input, output).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["input"], input.to_str().unwrap());
        assert_eq!(value["output"], output.to_str().unwrap());
    }

    #[test]
    fn test_worker_script_takes_parameters_from_argv() {
        assert!(WORKER_SCRIPT.contains("model_name = sys.argv[1]"));
        assert!(WORKER_SCRIPT.contains("ddim_steps = int(sys.argv[2])"));
        assert!(WORKER_SCRIPT.contains("guidance_scale = float(sys.argv[3])"));
        // Built once, before the request loop
        let build = WORKER_SCRIPT.find("build_model(").unwrap();
        let request_loop = WORKER_SCRIPT.find("for line in sys.stdin").unwrap();
        assert!(build < request_loop);
    }

    #[test]
    fn test_exit_messages_are_distinct() {
        let messages = [
            exit_message(Some(1), ""),
            exit_message(Some(2), "no checkpoint"),
            stage_message("inference", "nan"),
            stage_message("save", "disk full"),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(messages[1].contains("no checkpoint"));
    }

    #[test]
    fn test_decode_raw_little_endian() {
        let mut bytes = Vec::new();
        for v in [0.5f32, -1.0, 0.25, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let array = decode_raw(&bytes, &[1, 4]).unwrap();
        assert_eq!(array.shape(), &[1, 4]);
        assert_eq!(array[[0, 1]], -1.0);
    }

    #[test]
    fn test_decode_raw_shape_mismatch() {
        let bytes = [0u8; 12];
        assert!(decode_raw(&bytes, &[2, 2]).is_err());
        assert!(decode_raw(&bytes[..5], &[1]).is_err());
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails() {
        let command = AudioSrCommand::new("/nonexistent/python");
        let result = command.upsample(Path::new("/tmp/chunk_000.wav"), 44_100).await;
        assert!(matches!(result, Err(AudioliftError::DecodeFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_is_reused_across_chunks() {
        let dir = TempDir::new().unwrap();
        let (command, starts) = fake_command(&dir, FAKE_WORKER);

        for i in 0..3 {
            let chunk = dir.path().join(format!("chunk_{i:03}.wav"));
            let output = command.upsample(&chunk, 16_000).await.unwrap();
            assert_eq!(output.shape(), &[1, 1, 2]);
            assert_eq!(output[[0, 0, 1]], 0.5);
            assert!(!chunk.with_extension("sr.f32").exists());
        }
        assert_eq!(worker_starts(&starts), 1);

        command.shutdown().await;
        command
            .upsample(&dir.path().join("chunk_003.wav"), 16_000)
            .await
            .unwrap();
        assert_eq!(worker_starts(&starts), 2);
        command.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_chunk_keeps_worker_alive() {
        let dir = TempDir::new().unwrap();
        let (command, starts) = fake_command(&dir, FAKE_WORKER);

        let result = command
            .upsample(&dir.path().join("bad_chunk.wav"), 16_000)
            .await;
        match result {
            Err(AudioliftError::DecodeFailed(message)) => {
                assert!(message.contains("inference failed"), "{message}");
                assert!(message.contains("corrupt chunk"));
            }
            other => panic!("Expected DecodeFailed, got {other:?}"),
        }

        command
            .upsample(&dir.path().join("chunk_001.wav"), 16_000)
            .await
            .unwrap();
        assert_eq!(worker_starts(&starts), 1);
        command.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_startup_failure_reports_exit_status() {
        let dir = TempDir::new().unwrap();
        let (command, _) = fake_command(&dir, "echo 'checkpoint missing' >&2; exit 2");

        match command.upsample(&dir.path().join("chunk_000.wav"), 16_000).await {
            Err(AudioliftError::DecodeFailed(message)) => {
                assert!(message.starts_with("Failed to build AudioSR model"), "{message}");
                assert!(message.contains("checkpoint missing"));
            }
            other => panic!("Expected DecodeFailed, got {other:?}"),
        }
    }
}
