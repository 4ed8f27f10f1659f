use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tether_exec::{CommandResult, ExecError, RemoteExecutor};

/// Records every command and answers from a table of prefixes
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: Vec<(String, i32, String)>,
    commands: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` print `stdout` and exit 0
    pub fn reply(self, prefix: &str, stdout: &str) -> Self {
        self.reply_status(prefix, 0, stdout)
    }

    pub fn reply_status(mut self, prefix: &str, status: i32, stdout: &str) -> Self {
        self.replies
            .push((prefix.to_string(), status, stdout.to_string()));
        self
    }

    pub fn recorded(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.commands.lock().unwrap().push(cmd.to_string());

        let (status, stdout) = self
            .replies
            .iter()
            .find(|(prefix, _, _)| cmd.starts_with(prefix.as_str()))
            .map(|(_, status, stdout)| (*status, stdout.clone()))
            .unwrap_or((0, String::new()));

        Ok(CommandResult {
            status,
            stdout,
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "scripted"
    }
}
