//! Authentication handling for the GitHub API.

use std::process::Command;

use secrecy::SecretString;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variables checked for a token, in order.
pub const TOKEN_VARS: [&str; 2] = ["TARMAC_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Authentication method for the GitHub API.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Use token from gh CLI.
    GhCli,

    /// Use token from environment variable.
    EnvVar(String),

    /// Use a specific token.
    Token(SecretString),
}

impl Auth {
    /// Create auth from the first available method.
    ///
    /// Tries in order: `TARMAC_GITHUB_TOKEN`, `GITHUB_TOKEN`, gh CLI.
    #[must_use]
    pub fn auto() -> Self {
        TOKEN_VARS
            .iter()
            .find(|var| std::env::var(var).is_ok_and(|value| !value.is_empty()))
            .map_or(Self::GhCli, |var| Self::EnvVar((*var).to_string()))
    }

    /// Resolve the authentication to a token.
    ///
    /// # Errors
    /// Returns error if token cannot be obtained.
    pub fn resolve(&self) -> Result<SecretString> {
        match self {
            Self::GhCli => get_gh_token(),
            Self::EnvVar(var) => {
                debug!(var, "using token from environment");
                std::env::var(var)
                    .map(SecretString::from)
                    .map_err(|_| Error::NoToken)
            }
            Self::Token(token) => Ok(token.clone()),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::auto()
    }
}

/// Get GitHub token from gh CLI.
fn get_gh_token() -> Result<SecretString> {
    let output = Command::new("gh").args(["auth", "token"]).output()?;

    if !output.status.success() {
        return Err(Error::NoToken);
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();

    if token.is_empty() {
        return Err(Error::NoToken);
    }

    Ok(SecretString::from(token))
}
