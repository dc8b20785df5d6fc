//! KI-010: Local execution transport.

use super::{ExecOutput, Transport};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs scripts on this machine; used when a node's address is loopback.
#[derive(Debug, Default)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn exec(&mut self, script: &str) -> Result<ExecOutput, String> {
        exec_local(script)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), String> {
        let dest = Path::new(remote);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
        }
        std::fs::copy(local, dest)
            .map_err(|e| format!("cannot copy {} → {}: {}", local.display(), remote, e))?;
        Ok(())
    }
}

/// Execute a shell script locally via `bash`.
/// Uses bash (not sh/dash) because generated scripts use `set -o pipefail`.
pub fn exec_local(script: &str) -> Result<ExecOutput, String> {
    let mut child = Command::new("bash")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn bash: {}", e))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ki010_local_echo() {
        let out = exec_local("echo hello").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_ki010_local_failure() {
        let out = exec_local("exit 42").unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[test]
    fn test_ki010_local_stderr() {
        let out = exec_local("echo err >&2").unwrap();
        assert!(out.success());
        assert!(out.stderr.contains("err"));
    }

    #[test]
    fn test_ki010_local_pipefail() {
        let out = exec_local("set -euo pipefail\nfalse | true").unwrap();
        assert!(!out.success(), "pipefail should catch false in pipeline");
    }

    #[test]
    fn test_ki010_local_upload() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pkg.tgz");
        std::fs::write(&src, "payload").unwrap();
        let dest = dir.path().join("nested/dir/pkg.tgz");

        let mut t = LocalTransport;
        t.upload(&src, dest.to_str().unwrap()).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "payload");
    }
}
