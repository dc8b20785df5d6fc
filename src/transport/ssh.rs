//! KI-011: SSH execution transport.
//!
//! Uses the `ssh`/`scp` binaries directly, without libssh2.
//! Script is piped to stdin (not passed as argument) to avoid
//! argument length limits and injection vectors. The first command opens a
//! multiplexed master connection that later commands reuse; `close` ends it.

use super::{quote, ExecOutput, HostInfo, Transport};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Carries the jump-server password to the proxy command's `sshpass -e`.
const JUMP_PASSWORD_ENV: &str = "KUBEI_JUMP_SSHPASS";

/// SSH channel to one host.
#[derive(Debug)]
pub struct SshTransport {
    info: HostInfo,
    control_path: PathBuf,
    opened: bool,
}

impl SshTransport {
    pub fn new(info: HostInfo) -> Self {
        let control_path = std::env::temp_dir().join(format!(
            "kubei-{}-{}@{}-{}",
            std::process::id(),
            info.user,
            info.host,
            info.port
        ));
        Self {
            info,
            control_path,
            opened: false,
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.info.user, self.info.host)
    }

    /// Build a command, prefixed with `sshpass -e` when password auth is used.
    /// Passwords travel in the environment, never in argv.
    fn base_command(&self, program: &str) -> Command {
        let mut cmd = match self.info.password {
            Some(ref password) => {
                let mut cmd = Command::new("sshpass");
                cmd.env("SSHPASS", password).arg("-e").arg(program);
                cmd
            }
            None => Command::new(program),
        };
        if let Some(password) = self.info.jump.as_ref().and_then(|j| j.password.as_ref()) {
            cmd.env(JUMP_PASSWORD_ENV, password);
        }
        cmd
    }
}

/// Options shared by `ssh` and `scp`.
fn common_options(info: &HostInfo, control_path: &Path) -> Vec<String> {
    let mut opts: Vec<String> = vec![
        "-o".into(),
        "ConnectTimeout=10".into(),
        "-o".into(),
        "StrictHostKeyChecking=accept-new".into(),
        "-o".into(),
        "ControlMaster=auto".into(),
        "-o".into(),
        format!("ControlPath={}", control_path.display()),
        "-o".into(),
        "ControlPersist=120s".into(),
    ];

    if info.password.is_none() {
        opts.push("-o".into());
        opts.push("BatchMode=yes".into());
    }

    if let Some(ref key) = info.key {
        opts.push("-i".into());
        opts.push(expand_home(key));
    }

    if let Some(ref jump) = info.jump {
        let mut proxy = String::from("ssh -o StrictHostKeyChecking=accept-new -W %h:%p");
        proxy.push_str(&format!(" -p {}", jump.port));
        if let Some(ref key) = jump.key {
            proxy.push_str(&format!(" -i {}", quote(&expand_home(key))));
        }
        proxy.push_str(&format!(" {}@{}", jump.user, jump.host));
        if jump.password.is_some() {
            // the inner shell moves the password into SSHPASS
            let inner = format!("SSHPASS=${} exec sshpass -e {}", JUMP_PASSWORD_ENV, proxy);
            proxy = format!("sh -c {}", quote(&inner));
        }
        opts.push("-o".into());
        opts.push(format!("ProxyCommand={}", proxy));
    }

    opts
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

fn collect(child: std::process::Child, stdin_payload: Option<&str>, host: &str) -> Result<ExecOutput, String> {
    let mut child = child;
    if let (Some(payload), Some(stdin)) = (stdin_payload, child.stdin.as_mut()) {
        stdin
            .write_all(payload.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }
    let output = child
        .wait_with_output()
        .map_err(|e| format!("ssh wait error on {}: {}", host, e))?;
    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

impl Transport for SshTransport {
    fn exec(&mut self, script: &str) -> Result<ExecOutput, String> {
        let mut cmd = self.base_command("ssh");
        cmd.args(common_options(&self.info, &self.control_path))
            .args(["-p", &self.info.port.to_string()])
            .arg(self.target())
            .arg("bash")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn ssh to {}: {}", self.info.host, e))?;
        self.opened = true;
        let out = collect(child, Some(script), &self.info.host)?;

        // 255 is ssh's own failure code (auth, unreachable, ...)
        if out.exit_code == 255 {
            return Err(format!(
                "ssh to {}@{}:{} failed: {}",
                self.info.user,
                self.info.host,
                self.info.port,
                out.stderr.trim()
            ));
        }
        Ok(out)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), String> {
        let mut cmd = self.base_command("scp");
        cmd.args(common_options(&self.info, &self.control_path))
            .args(["-P", &self.info.port.to_string()])
            .arg(local)
            .arg(format!("{}:{}", self.target(), remote))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn scp to {}: {}", self.info.host, e))?;
        self.opened = true;
        let out = collect(child, None, &self.info.host)?;
        if !out.success() {
            return Err(format!(
                "scp {} → {}:{} failed: {}",
                local.display(),
                self.info.host,
                remote,
                out.stderr.trim()
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.opened {
            return;
        }
        let _ = Command::new("ssh")
            .args(["-o", &format!("ControlPath={}", self.control_path.display())])
            .args(["-O", "exit"])
            .arg(self.target())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::JumpServer;

    fn info() -> HostInfo {
        HostInfo {
            host: "10.0.0.1".to_string(),
            port: 22,
            user: "root".to_string(),
            password: None,
            key: None,
            jump: None,
        }
    }

    #[test]
    fn test_ki011_key_expansion() {
        let expanded = expand_home("~/.ssh/id_ed25519");
        assert!(expanded.contains(".ssh/id_ed25519"));
        assert!(!expanded.starts_with('~'));
        assert_eq!(expand_home("/etc/key"), "/etc/key");
    }

    #[test]
    fn test_ki011_options_multiplex_and_batch() {
        let opts = common_options(&info(), Path::new("/tmp/cp"));
        assert!(opts.contains(&"ControlMaster=auto".to_string()));
        assert!(opts.contains(&"ControlPath=/tmp/cp".to_string()));
        assert!(opts.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn test_ki011_password_disables_batch_mode() {
        let mut i = info();
        i.password = Some("pw".to_string());
        let opts = common_options(&i, Path::new("/tmp/cp"));
        assert!(!opts.contains(&"BatchMode=yes".to_string()));
        let t = SshTransport::new(i);
        assert_eq!(t.base_command("ssh").get_program(), "sshpass");
    }

    #[test]
    fn test_ki011_jump_server_proxy_command() {
        let mut i = info();
        let mut jump = JumpServer::parse("ops@bastion:2200").unwrap();
        jump.key = Some("/keys/bastion".to_string());
        i.jump = Some(jump);
        let opts = common_options(&i, Path::new("/tmp/cp"));
        let proxy = opts
            .iter()
            .find(|o| o.starts_with("ProxyCommand="))
            .expect("proxy command");
        assert!(proxy.contains("-W %h:%p"));
        assert!(proxy.contains("-p 2200"));
        assert!(proxy.contains("'/keys/bastion'"));
        assert!(proxy.ends_with("ops@bastion"));
    }

    #[test]
    fn test_ki011_jump_password_stays_out_of_argv() {
        let mut i = info();
        let mut jump = JumpServer::parse("ops@bastion:2200").unwrap();
        jump.password = Some("s3cret".to_string());
        i.jump = Some(jump);

        let opts = common_options(&i, Path::new("/tmp/cp"));
        assert!(opts.iter().all(|o| !o.contains("s3cret")));
        let proxy = opts.iter().find(|o| o.starts_with("ProxyCommand=")).unwrap();
        assert!(proxy.contains("sshpass -e ssh"), "{}", proxy);
        assert!(proxy.contains("SSHPASS=$KUBEI_JUMP_SSHPASS"), "{}", proxy);

        let cmd = SshTransport::new(i).base_command("ssh");
        assert!(cmd.get_args().all(|a| a != "s3cret"));
        let env: Vec<_> = cmd.get_envs().collect();
        assert!(env.contains(&(
            std::ffi::OsStr::new(JUMP_PASSWORD_ENV),
            Some(std::ffi::OsStr::new("s3cret"))
        )));
    }

    #[test]
    fn test_ki011_control_path_is_per_host() {
        let a = SshTransport::new(info());
        let mut other = info();
        other.host = "10.0.0.2".to_string();
        let b = SshTransport::new(other);
        assert_ne!(a.control_path, b.control_path);
    }
}
