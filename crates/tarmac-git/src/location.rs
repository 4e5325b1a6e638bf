//! Where a branch lives and how we reach it.

use std::path::PathBuf;

use secrecy::SecretString;

/// A branch on a remote, as the merge machinery sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLocation {
    /// Service identity, e.g. `gh:owner/repo/main`.
    pub identity: String,
    /// Fetch URL (or local path) of the repository.
    pub url: String,
    /// Branch name inside the repository.
    pub branch: String,
}

impl BranchLocation {
    /// Create a new location.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            url: url.into(),
            branch: branch.into(),
        }
    }

    /// A refname-safe key derived from the identity.
    #[must_use]
    pub fn ref_key(&self) -> String {
        let key: String = self
            .identity
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        key.trim_matches('-').to_string()
    }
}

/// Where the target working tree is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingDirPolicy {
    /// A configured directory reused across runs.
    Persistent(PathBuf),
    /// A fresh temporary directory removed when the handle drops.
    Scratch,
}

/// Identity used for the merge commits we create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    /// Parse `Name <email>`, falling back to the default committer email.
    #[must_use]
    pub fn parse(identity: &str) -> Self {
        let (name, email) = crate::metadata::parse_identity(identity);
        Self {
            name,
            email: email.unwrap_or_else(|| Self::default().email),
        }
    }
}

impl Default for Committer {
    fn default() -> Self {
        Self {
            name: "Tarmac".into(),
            email: "tarmac@localhost".into(),
        }
    }
}

/// Token handed to git as HTTP credentials.
///
/// Kept out of URLs so it never lands in `.git/config` or logs.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Option<SecretString>,
}

impl Credentials {
    /// No credentials; works for local paths and public remotes.
    #[must_use]
    pub const fn none() -> Self {
        Self { token: None }
    }

    /// Authenticate with a service token.
    #[must_use]
    pub const fn token(token: SecretString) -> Self {
        Self { token: Some(token) }
    }

    pub(crate) const fn secret(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }
}
