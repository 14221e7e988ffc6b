//! Spawning external collaborators (FFmpeg, Demucs, the AudioSR worker).

use std::ffi::OsStr;

use tokio::process::Command;

/// Build a command for an external collaborator.
///
/// The child gets its own process group, so a terminal Ctrl+C reaches only
/// audiolift; the cancel token then stops the run between chunks.
pub(crate) fn collaborator_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    #[cfg(unix)]
    command.process_group(0);
    command.kill_on_drop(true);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_collaborator_leads_its_own_process_group() {
        // Fields 1 and 5 of /proc/<pid>/stat are the pid and the process group
        let output = collaborator_command("sh")
            .args(["-c", "read -r pid _ _ _ pgrp _ < /proc/$$/stat; echo \"$pid $pgrp\""])
            .output()
            .await
            .unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let ids: Vec<&str> = stdout.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "unexpected output: {stdout}");
        assert_eq!(ids[0], ids[1]);
    }
}
