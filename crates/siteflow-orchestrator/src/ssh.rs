//! Remote command execution
//!
//! The orchestrator treats SSH as an opaque, slow, fallible executor: run a
//! command, get back success/failure plus captured output. The production
//! implementation shells out to the `ssh`/`scp` binaries; tests inject
//! their own implementation of the trait.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

/// Authentication material for a remote host
#[derive(Debug, Clone)]
pub struct SshAuth {
    /// Login user ("root" unless the provider overrides it)
    pub user: String,

    /// Path to the private key, already decrypted to disk
    pub key_path: Option<PathBuf>,

    pub port: u16,
}

impl SshAuth {
    pub fn root() -> Self {
        Self {
            user: "root".to_string(),
            key_path: None,
            port: 22,
        }
    }

    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key_path: None,
            port: 22,
        }
    }

    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }
}

/// Captured result of one remote command
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub output: String,
}

/// Opaque remote-command executor
///
/// Callers must not assume sub-second latency; post-provision scripts can
/// run for minutes.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command on the host. `action_tag` and `record_id` identify
    /// the workflow step for logging and history.
    async fn exec(
        &self,
        host: &str,
        command: &str,
        auth: &SshAuth,
        action_tag: &str,
        record_id: Uuid,
    ) -> Result<ExecOutcome>;

    /// Fetch a remote file's contents
    async fn download(&self, host: &str, remote_path: &str, auth: &SshAuth) -> Result<Vec<u8>>;
}

/// Executor backed by the OpenSSH client binaries
#[derive(Debug, Default)]
pub struct OpenSshExecutor;

impl OpenSshExecutor {
    pub fn new() -> Self {
        Self
    }

    fn base_args(auth: &SshAuth) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=30".to_string(),
        ];
        if let Some(key) = &auth.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    async fn exec(
        &self,
        host: &str,
        command: &str,
        auth: &SshAuth,
        action_tag: &str,
        record_id: Uuid,
    ) -> Result<ExecOutcome> {
        let mut cmd = Command::new("ssh");
        cmd.args(Self::base_args(auth));
        cmd.arg("-p").arg(auth.port.to_string());
        cmd.arg(format!("{}@{}", auth.user, host));
        cmd.arg(command);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(host, action = action_tag, record = %record_id, "Running remote command");

        let output = cmd.output().await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.stderr.is_empty() {
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(ExecOutcome {
            success: output.status.success(),
            output: combined,
        })
    }

    async fn download(&self, host: &str, remote_path: &str, auth: &SshAuth) -> Result<Vec<u8>> {
        let local = tempfile::NamedTempFile::new()?;
        let local_path = local.path().to_path_buf();

        let mut cmd = Command::new("scp");
        cmd.args(Self::base_args(auth));
        cmd.arg("-P").arg(auth.port.to_string());
        cmd.arg(format!("{}@{}:{}", auth.user, host, remote_path));
        cmd.arg(&local_path);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(OrchestratorError::Exec {
                host: host.to_string(),
                output: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(tokio::fs::read(&local_path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_included_in_args() {
        let auth = SshAuth::root().with_key("/tmp/id_ed25519");
        let args = OpenSshExecutor::base_args(&auth);
        assert!(args.contains(&"-i".to_string()));
        assert!(args.contains(&"/tmp/id_ed25519".to_string()));
    }

    #[test]
    fn test_default_auth_is_root_on_22() {
        let auth = SshAuth::root();
        assert_eq!(auth.user, "root");
        assert_eq!(auth.port, 22);
        assert!(auth.key_path.is_none());
    }
}
