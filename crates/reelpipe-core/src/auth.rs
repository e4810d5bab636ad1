//! Bearer tokens for the Google APIs.

use std::process::Command;
use std::sync::Mutex;

use crate::config::GoogleConfig;
use crate::error::{PipelineError, Result};

pub enum TokenSource {
    Static(String),
    Env(String),
    /// Shell command whose trimmed stdout is the token. Cached after the
    /// first successful run.
    Command {
        command: String,
        cached: Mutex<Option<String>>,
    },
}

impl TokenSource {
    pub fn from_config(cfg: &GoogleConfig) -> Self {
        match &cfg.token_command {
            Some(cmd) if !cmd.trim().is_empty() => TokenSource::Command {
                command: cmd.clone(),
                cached: Mutex::new(None),
            },
            _ => TokenSource::Env(cfg.token_env.clone()),
        }
    }

    pub fn token(&self) -> Result<String> {
        match self {
            TokenSource::Static(t) => Ok(t.clone()),
            TokenSource::Env(var) => std::env::var(var)
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| PipelineError::Auth(format!("environment variable {var} is not set"))),
            TokenSource::Command { command, cached } => {
                let mut guard = cached
                    .lock()
                    .map_err(|_| PipelineError::Auth("token cache poisoned".into()))?;
                if let Some(t) = guard.as_ref() {
                    return Ok(t.clone());
                }
                let token = run_token_command(command)?;
                *guard = Some(token.clone());
                Ok(token)
            }
        }
    }
}

fn run_token_command(command: &str) -> Result<String> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    let output = cmd
        .output()
        .map_err(|e| PipelineError::Auth(format!("failed to run '{command}': {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Auth(format!(
            "'{command}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(PipelineError::Auth(format!("'{command}' printed no token")));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token() {
        assert_eq!(TokenSource::Static("abc".into()).token().unwrap(), "abc");
    }

    #[test]
    fn missing_env_is_auth_error() {
        let src = TokenSource::Env("REELPIPE_TEST_TOKEN_THAT_DOES_NOT_EXIST".into());
        assert!(matches!(src.token(), Err(PipelineError::Auth(_))));
    }

    #[test]
    fn config_prefers_command() {
        let cfg = GoogleConfig {
            token_env: "X".into(),
            token_command: Some("echo tok".into()),
        };
        assert!(matches!(TokenSource::from_config(&cfg), TokenSource::Command { .. }));
        let cfg = GoogleConfig {
            token_env: "X".into(),
            token_command: Some("  ".into()),
        };
        assert!(matches!(TokenSource::from_config(&cfg), TokenSource::Env(v) if v == "X"));
    }

    #[cfg(unix)]
    #[test]
    fn command_token_is_trimmed_and_cached() {
        let src = TokenSource::Command {
            command: "echo '  ya29.token  '".into(),
            cached: Mutex::new(None),
        };
        assert_eq!(src.token().unwrap(), "ya29.token");
        assert_eq!(src.token().unwrap(), "ya29.token");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_auth_error() {
        let src = TokenSource::Command {
            command: "exit 3".into(),
            cached: Mutex::new(None),
        };
        assert!(matches!(src.token(), Err(PipelineError::Auth(_))));
    }
}
