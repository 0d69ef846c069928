//! Command relay: session transcript → model → optional shell command.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::executor::ShellExecutor;
use crate::llm::LanguageModel;
use crate::metrics::RelayMetrics;
use crate::reply::ModelReply;
use crate::session::{SessionStore, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Shell command ran cleanly
    Success,
    /// Shell command failed or was refused
    Error,
    /// Plain model text
    Gemini,
}

/// What the client gets back for a handled command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResult {
    pub output: String,
    #[serde(rename = "type")]
    pub kind: ResultKind,
}

impl RelayResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            kind: ResultKind::Success,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            kind: ResultKind::Error,
        }
    }

    pub fn gemini(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            kind: ResultKind::Gemini,
        }
    }
}

pub struct CommandRelay {
    store: Arc<SessionStore>,
    model: Arc<dyn LanguageModel>,
    executor: ShellExecutor,
    metrics: Arc<RelayMetrics>,
}

impl CommandRelay {
    pub fn new(
        store: Arc<SessionStore>,
        model: Arc<dyn LanguageModel>,
        executor: ShellExecutor,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            store,
            model,
            executor,
            metrics,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Handle one command for a session.
    ///
    /// The user turn is recorded before the model is called and stays in the
    /// transcript if the call fails. A reply that arrives after its session was
    /// evicted is still returned but not recorded.
    pub async fn handle(
        &self,
        session_id: &str,
        command_text: &str,
    ) -> Result<RelayResult, RelayError> {
        if command_text.trim().is_empty() {
            return Err(RelayError::InvalidInput("Command is required".to_string()));
        }

        let (transcript, ticket) = self
            .store
            .begin_exchange(session_id, Turn::user(command_text));

        let reply = self.model.generate(&transcript).await.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "model call failed");
            match e {
                RelayError::Upstream(_) => e,
                other => RelayError::Upstream(other.to_string()),
            }
        })?;
        self.metrics.record_model_reply();

        if !self
            .store
            .complete_exchange(session_id, ticket, Turn::assistant(reply.clone()))
        {
            warn!(session_id = %session_id, "session evicted during model call, reply not recorded");
        }

        match ModelReply::parse(&reply) {
            ModelReply::Text(text) => Ok(RelayResult::gemini(text)),
            ModelReply::Shell(command) => {
                info!(session_id = %session_id, command = %command, "model requested shell command");
                let result = self.run_shell(&command).await;
                self.metrics
                    .record_shell(result.kind == ResultKind::Success);
                Ok(result)
            }
        }
    }

    async fn run_shell(&self, command: &str) -> RelayResult {
        let output = match self.executor.run(command).await {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %command, error = %e, "shell command not run");
                return RelayResult::error(e.to_string());
            }
        };

        if !output.success() {
            warn!(command = %command, exit_code = ?output.exit_code, stderr = %output.stderr, "shell command failed");
            if output.stderr.is_empty() {
                let status = output
                    .exit_code
                    .map(|c| format!("exit code {}", c))
                    .unwrap_or_else(|| "terminated by signal".to_string());
                return RelayResult::error(format!("Command failed ({}): {}", status, command));
            }
            return RelayResult::error(output.stderr);
        }

        if !output.stderr.is_empty() {
            warn!(command = %command, stderr = %output.stderr, "shell command wrote to stderr");
            return RelayResult::error(output.stderr);
        }

        RelayResult::success(output.stdout)
    }
}
