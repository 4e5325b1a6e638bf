//! Configuration management for Tarmac.
//!
//! One TOML file holds global settings under `[tarmac]` and one table per
//! target branch under `[branches."gh:owner/repo/branch"]`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable overriding the configuration directory.
pub const CONFIG_HOME_VAR: &str = "TARMAC_CONFIG_HOME";

/// Configuration file name inside the configuration directory.
pub const CONFIG_FILE: &str = "tarmac.toml";

/// Tarmac configuration loaded from `tarmac.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global settings.
    #[serde(default)]
    pub tarmac: Settings,

    /// Per-branch settings keyed by branch URL.
    #[serde(default)]
    pub branches: BTreeMap<String, BranchConfig>,
}

impl Config {
    /// Load config from a TOML file.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to a TOML file.
    ///
    /// # Errors
    /// Returns error if serialization or write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Default location of the configuration file.
    ///
    /// `$TARMAC_CONFIG_HOME/tarmac.toml`, else `<config dir>/tarmac/tarmac.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_HOME_VAR)
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("tarmac")))
            .unwrap_or_else(|| PathBuf::from(".tarmac"))
            .join(CONFIG_FILE)
    }

    /// Settings for `url`; defaults when the branch is not configured.
    #[must_use]
    pub fn branch(&self, url: &str) -> BranchConfig {
        self.branches.get(url).cloned().unwrap_or_default()
    }

    /// Configured branch URLs, sorted.
    #[must_use]
    pub fn branch_urls(&self) -> Vec<String> {
        self.branches
            .keys()
            .filter(|url| url.starts_with("gh:"))
            .cloned()
            .collect()
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Status rejected proposals are moved to when the branch sets none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_branch_status: Option<String>,

    /// Use the proposal description when it has no commit message.
    #[serde(default)]
    pub imply_commit_message: bool,

    /// Land at most one proposal per run.
    #[serde(default)]
    pub one: bool,

    /// Write logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Committer identity as `Name <email>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,

    /// Commit message template for branches without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message_template: Option<String>,

    /// Custom API URL for GitHub Enterprise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Custom web URL for GitHub Enterprise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

/// Settings for one target branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Persistent working tree; a scratch directory is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_dir: Option<PathBuf>,

    /// Overrides the global `imply_commit_message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imply_commit_message: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_branch_status: Option<String>,

    /// Placeholders: `<commit_message>`, `<author>`, `<reviewer>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message_template: Option<String>,

    /// Command that must pass on the merged tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<String>,

    /// Command run before `verify_command`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_command: Option<String>,

    /// Seconds the verify command may run.
    #[serde(default = "default_verify_command_timeout")]
    pub verify_command_timeout: u64,

    /// Seconds the verify command may stay silent.
    #[serde(default = "default_verify_command_output_timeout")]
    pub verify_command_output_timeout: u64,

    /// Who may author landed changes; anyone when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_contributors: Option<Vec<String>>,

    /// E.g. `Approve >= 2, Disapprove == 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_criteria: Option<String>,

    /// Label added to issues fixed by a landing.
    #[serde(default = "default_fix_committed_label")]
    pub fix_committed_label: String,

    /// Keys this crate does not know about, for out-of-tree hooks.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl BranchConfig {
    /// Look up a key this crate does not model.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.extra.get(key)
    }
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            tree_dir: None,
            imply_commit_message: None,
            rejected_branch_status: None,
            commit_message_template: None,
            verify_command: None,
            setup_command: None,
            verify_command_timeout: default_verify_command_timeout(),
            verify_command_output_timeout: default_verify_command_output_timeout(),
            allowed_contributors: None,
            voting_criteria: None,
            fix_committed_label: default_fix_committed_label(),
            extra: BTreeMap::new(),
        }
    }
}

const fn default_verify_command_timeout() -> u64 {
    3600
}

const fn default_verify_command_output_timeout() -> u64 {
    900
}

fn default_fix_committed_label() -> String {
    "fix-committed".into()
}
