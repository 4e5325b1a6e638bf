//! Git-backed branch handles.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, Cred, ErrorCode, FetchOptions, FetchPrune, Oid, PushOptions, RemoteCallbacks,
    Repository, ResetType, Signature, Sort, Status, StatusOptions,
};
use secrecy::ExposeSecret;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::location::{BranchLocation, Committer, Credentials, WorkingDirPolicy};
use crate::metadata;
use crate::traits::{BranchOpener, BranchOps, CommitRequest};

const ORIGIN: &str = "origin";

#[derive(Debug, Clone, Copy)]
enum Side {
    /// Checked out with a working tree; merges land here.
    Target,
    /// History fetched into the target repository.
    Source { tip: Oid, base: Oid },
}

/// One branch of a merge, backed by a git repository.
pub struct BranchHandle {
    location: BranchLocation,
    side: Side,
    repo: Repository,
    credentials: Credentials,
    committer: Committer,
    /// Source revision merged into the index but not yet committed.
    pending: Option<Oid>,
    // Must stay after `repo`: fields drop in order, and the repository
    // has to be closed before its directory goes away.
    scratch: Option<TempDir>,
}

impl BranchHandle {
    /// Whether this handle owns a throwaway directory.
    #[must_use]
    pub const fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    fn is_source(&self) -> bool {
        matches!(self.side, Side::Source { .. })
    }

    fn require_target(&self) -> Result<()> {
        if self.is_source() {
            Err(Error::NoWorkingTree)
        } else {
            Ok(())
        }
    }

    fn head_oid(&self) -> Result<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    fn tip(&self) -> Result<Oid> {
        match self.side {
            Side::Source { tip, .. } => Ok(tip),
            Side::Target => self.head_oid(),
        }
    }

    /// Resolve a revision that must be part of this branch's history.
    fn resolve(&self, revision: &str) -> Result<Oid> {
        let oid = self
            .repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|_| Error::RevisionNotFound(revision.into()))?;

        let tip = self.tip()?;
        if oid == tip || self.repo.graph_descendant_of(tip, oid)? {
            Ok(oid)
        } else {
            Err(Error::RevisionNotFound(revision.into()))
        }
    }

    fn count_revisions(&self, oid: Oid) -> Result<usize> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(oid)?;
        Ok(revwalk.count())
    }

    /// Commits reachable from `tip` but not from `hide`, oldest first.
    fn unique_ancestry(&self, tip: Oid, hide: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(tip)?;
        revwalk.hide(hide)?;
        Ok(revwalk.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Fetch the tracked branch from origin and return its tip.
    fn update(&self) -> Result<Oid> {
        let branch = &self.location.branch;
        let tracking = format!("refs/remotes/{ORIGIN}/{branch}");

        let mut remote = self.repo.find_remote(ORIGIN)?;
        let mut options = fetch_options(&self.credentials);
        remote.fetch(
            &[format!("+refs/heads/{branch}:{tracking}")],
            Some(&mut options),
            None,
        )?;

        Ok(self.repo.refname_to_id(&tracking)?)
    }

    /// Delete untracked and ignored files left over from earlier runs.
    fn purge_residue(&self) -> Result<usize> {
        let workdir = self.repo.workdir().ok_or(Error::NoWorkingTree)?;

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .include_ignored(true)
            .recurse_untracked_dirs(false)
            .recurse_ignored_dirs(false)
            .exclude_submodules(true);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let residue: Vec<PathBuf> = statuses
            .iter()
            .filter(|entry| entry.status().intersects(Status::WT_NEW | Status::IGNORED))
            .filter_map(|entry| {
                entry
                    .path()
                    .map(|path| workdir.join(path.trim_end_matches('/')))
            })
            .collect();

        for path in &residue {
            debug!(path = %path.display(), "removing residue");
            let removed = match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
                Ok(_) => fs::remove_file(path),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            removed?;
        }

        Ok(residue.len())
    }

    /// Push refspecs to origin, turning rejections into `OutOfDate`.
    fn push(&self, refspecs: &[String]) -> Result<()> {
        let mut remote = self.repo.find_remote(ORIGIN)?;
        let mut rejected: Vec<String> = Vec::new();

        {
            let mut callbacks = remote_callbacks(&self.credentials);
            callbacks.push_update_reference(|refname, status| {
                if let Some(reason) = status {
                    rejected.push(format!("{refname}: {reason}"));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            remote
                .push(refspecs, Some(&mut options))
                .map_err(|err| match err.code() {
                    ErrorCode::NotFastForward => Error::OutOfDate(err.message().to_string()),
                    _ => Error::from(err),
                })?;
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(Error::OutOfDate(rejected.join(", ")))
        }
    }

    fn signature(identity: &str) -> Result<Signature<'static>> {
        let (name, email) = metadata::parse_identity(identity);
        Ok(Signature::now(&name, email.as_deref().unwrap_or_default())?)
    }

    fn commit_authors(&self, oids: &[Oid]) -> Result<Vec<String>> {
        let mut authors: Vec<String> = Vec::new();
        for oid in oids {
            let commit = self.repo.find_commit(*oid)?;
            let author = commit.author();
            let primary = metadata::format_identity(
                author.name().unwrap_or_default(),
                author.email().unwrap_or_default(),
            );
            let co_authors =
                metadata::trailer_values(commit.message().unwrap_or_default(), metadata::CO_AUTHORED_BY);

            for identity in std::iter::once(primary).chain(co_authors) {
                if !identity.is_empty() && !authors.contains(&identity) {
                    authors.push(identity);
                }
            }
        }
        Ok(authors)
    }
}

impl BranchOps for BranchHandle {
    fn location(&self) -> &BranchLocation {
        &self.location
    }

    fn workdir(&self) -> Option<&Path> {
        if self.is_source() {
            None
        } else {
            self.repo.workdir()
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.is_source() {
            return Ok(());
        }

        self.pending = None;
        self.repo.cleanup_state()?;

        let tip = self.update()?;
        let commit = self.repo.find_commit(tip)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;

        let purged = self.purge_residue()?;
        debug!(branch = %self.location.identity, %tip, purged, "working tree cleaned");
        Ok(())
    }

    fn merge(&mut self, other: &Self, to_revision: Option<&str>) -> Result<()> {
        self.require_target()?;

        let oid = match to_revision {
            Some(revision) => other.resolve(revision)?,
            None => other.tip()?,
        };

        let head = self.head_oid()?;
        if head == oid || self.repo.graph_descendant_of(head, oid)? {
            return Err(Error::NothingToMerge);
        }

        let annotated = self.repo.find_annotated_commit(oid)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true);
        self.repo
            .merge(&[&annotated], None, Some(&mut checkout))?;

        let index = self.repo.index()?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    paths.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            paths.sort();
            paths.dedup();
            return Err(Error::BranchHasConflicts(paths));
        }

        info!(
            into = %self.location.identity,
            from = %other.location.identity,
            revision = %oid,
            "merged"
        );
        self.pending = Some(oid);
        Ok(())
    }

    fn commit(&mut self, request: &CommitRequest) -> Result<Option<String>> {
        self.require_target()?;

        let supplied = request.authors.iter().flatten();
        if let Some(bad) = request
            .reviews
            .iter()
            .chain(supplied)
            .find(|value| value.contains('\n'))
        {
            return Err(Error::InvalidMetadata(format!(
                "newline in review or author {bad:?}"
            )));
        }
        for (key, value) in &request.revprops {
            if !metadata::is_valid_key(key) || value.contains('\n') {
                return Err(Error::InvalidMetadata(format!(
                    "revision property {key:?} cannot be stored"
                )));
            }
        }

        let pending = self.pending.ok_or(Error::NoPendingMerge)?;
        let authors = match &request.authors {
            Some(authors) if !authors.is_empty() => authors.clone(),
            _ => self.authors()?,
        };
        let co_authors = authors.get(1..).unwrap_or_default();
        let message =
            metadata::compose_message(&request.message, &request.revprops, &request.reviews, co_authors);

        if request.dry_run {
            info!(
                branch = %self.location.identity,
                authors = ?authors,
                "dry run, not committing:\n{message}"
            );
            return Ok(None);
        }

        let committer = Signature::now(&self.committer.name, &self.committer.email)?;
        let author = match authors.first() {
            Some(identity) => Self::signature(identity)?,
            None => committer.clone(),
        };

        let oid = {
            let tree_id = self.repo.index()?.write_tree()?;
            let tree = self.repo.find_tree(tree_id)?;
            let head = self.repo.head()?.peel_to_commit()?;
            let merged = self.repo.find_commit(pending)?;
            self.repo.commit(
                Some("HEAD"),
                &author,
                &committer,
                &message,
                &tree,
                &[&head, &merged],
            )?
        };
        self.repo.cleanup_state()?;
        self.pending = None;

        let branch = &self.location.branch;
        self.push(&[format!("refs/heads/{branch}:refs/heads/{branch}")])?;

        info!(branch = %self.location.identity, revision = %oid, "committed and pushed");
        Ok(Some(oid.to_string()))
    }

    fn merge_tags(&mut self, other: &Self, dry_run: bool) -> Result<usize> {
        self.require_target()?;
        if !other.is_source() {
            return Ok(0);
        }

        // Only tags on history that has landed here are carried over.
        let landed = match self.pending {
            Some(pending) => pending,
            None => self.head_oid()?,
        };
        let prefix = format!("refs/tarmac/tags/{}/", other.location.ref_key());
        let mut changed: Vec<(String, Oid)> = Vec::new();
        for reference in self.repo.references_glob(&format!("{prefix}*"))? {
            let reference = reference?;
            let (Some(name), Some(target)) = (reference.name(), reference.target()) else {
                continue;
            };
            let tag = format!("refs/tags/{}", &name[prefix.len()..]);
            let Ok(commit) = reference.peel_to_commit() else {
                continue;
            };
            let commit = commit.id();
            if commit != landed && !self.repo.graph_descendant_of(landed, commit)? {
                debug!(%tag, %commit, "tag is not on landed history; not merging");
                continue;
            }
            if self.repo.refname_to_id(&tag).ok() != Some(target) {
                changed.push((tag, target));
            }
        }

        if dry_run || changed.is_empty() {
            return Ok(changed.len());
        }

        for (tag, target) in &changed {
            self.repo.reference(tag, *target, true, "tarmac: merge tags")?;
        }
        let refspecs: Vec<String> = changed
            .iter()
            .map(|(tag, _)| format!("+{tag}:{tag}"))
            .collect();
        self.push(&refspecs)?;

        info!(branch = %self.location.identity, count = changed.len(), "merged tags");
        Ok(changed.len())
    }

    fn export_tree(&self, dest: &Path) -> Result<()> {
        self.require_target()?;

        let mut index = self.repo.index()?;
        let mut checkout = CheckoutBuilder::new();
        checkout.target_dir(dest).force().recreate_missing(true);
        self.repo
            .checkout_index(Some(&mut index), Some(&mut checkout))?;
        Ok(())
    }

    fn authors(&self) -> Result<Vec<String>> {
        let oids = match (self.side, self.pending) {
            (Side::Source { tip, base }, _) => self.unique_ancestry(tip, base)?,
            (Side::Target, Some(pending)) => self.unique_ancestry(pending, self.head_oid()?)?,
            (Side::Target, None) => vec![self.head_oid()?],
        };
        self.commit_authors(&oids)
    }

    fn fixed_issues(&self) -> Result<Vec<String>> {
        let head = self.repo.find_commit(self.tip()?)?;
        let oids = if head.parent_count() > 1 {
            self.unique_ancestry(head.id(), head.parent_id(0)?)?
        } else {
            vec![head.id()]
        };

        let mut issues: Vec<String> = Vec::new();
        for oid in oids {
            let commit = self.repo.find_commit(oid)?;
            for reference in metadata::fixed_issue_refs(commit.message().unwrap_or_default()) {
                let id = metadata::issue_id(&reference);
                if !issues.contains(&id) {
                    issues.push(id);
                }
            }
        }
        Ok(issues)
    }

    fn revision_number(&self, revision: &str) -> Result<usize> {
        let oid = self.resolve(revision)?;
        self.count_revisions(oid)
    }

    fn tip_revision_number(&self) -> Result<usize> {
        self.count_revisions(self.tip()?)
    }

    fn last_revision(&self) -> Result<String> {
        Ok(self.tip()?.to_string())
    }
}

impl std::fmt::Debug for BranchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchHandle")
            .field("identity", &self.location.identity)
            .field("side", &self.side)
            .field("path", &self.repo.path())
            .finish_non_exhaustive()
    }
}

/// Opens git-backed branch handles.
#[derive(Debug, Clone, Default)]
pub struct GitOpener {
    credentials: Credentials,
    committer: Committer,
}

impl GitOpener {
    /// Create an opener using `credentials` for every remote operation.
    #[must_use]
    pub const fn new(credentials: Credentials, committer: Committer) -> Self {
        Self {
            credentials,
            committer,
        }
    }
}

impl BranchOpener for GitOpener {
    type Branch = BranchHandle;

    fn open_target(
        &self,
        location: &BranchLocation,
        policy: &WorkingDirPolicy,
    ) -> Result<BranchHandle> {
        let (repo, scratch) = match policy {
            WorkingDirPolicy::Persistent(path) if path.exists() => {
                (open_existing(location, path)?, None)
            }
            WorkingDirPolicy::Persistent(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                (clone_branch(location, path, &self.credentials)?, None)
            }
            WorkingDirPolicy::Scratch => {
                let dir = tempfile::Builder::new().prefix("tarmac.").tempdir()?;
                let repo = clone_branch(location, dir.path(), &self.credentials)?;
                (repo, Some(dir))
            }
        };

        let mut handle = BranchHandle {
            location: location.clone(),
            side: Side::Target,
            repo,
            credentials: self.credentials.clone(),
            committer: self.committer.clone(),
            pending: None,
            scratch,
        };
        handle.cleanup()?;
        Ok(handle)
    }

    fn open_source(&self, location: &BranchLocation, target: &BranchHandle) -> Result<BranchHandle> {
        let repo = Repository::open(target.repo.path())?;
        let key = location.ref_key();
        let source_ref = format!("refs/tarmac/sources/{key}");
        let refspecs = [
            format!("+refs/heads/{}:{source_ref}", location.branch),
            format!("+refs/tags/*:refs/tarmac/tags/{key}/*"),
        ];

        {
            let mut remote = repo.remote_anonymous(&location.url)?;
            let mut options = fetch_options(&self.credentials);
            remote.fetch(&refspecs, Some(&mut options), None)?;
        }

        let tip = repo.refname_to_id(&source_ref)?;
        let base = target.head_oid()?;
        debug!(source = %location.identity, %tip, %base, "source fetched");

        Ok(BranchHandle {
            location: location.clone(),
            side: Side::Source { tip, base },
            repo,
            credentials: self.credentials.clone(),
            committer: self.committer.clone(),
            pending: None,
            scratch: None,
        })
    }
}

fn remote_callbacks(credentials: &Credentials) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = credentials.secret() {
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", token.expose_secret())
        });
    }
    callbacks
}

fn fetch_options(credentials: &Credentials) -> FetchOptions<'_> {
    let mut options = FetchOptions::new();
    options
        .remote_callbacks(remote_callbacks(credentials))
        .download_tags(AutotagOption::None)
        .prune(FetchPrune::On);
    options
}

fn clone_branch(location: &BranchLocation, dest: &Path, credentials: &Credentials) -> Result<Repository> {
    info!(
        url = %location.url,
        branch = %location.branch,
        dest = %dest.display(),
        "cloning target branch"
    );
    let mut builder = RepoBuilder::new();
    builder
        .branch(&location.branch)
        .fetch_options(fetch_options(credentials));
    Ok(builder.clone(&location.url, dest)?)
}

/// Open a configured tree, checking it tracks the expected branch.
fn open_existing(location: &BranchLocation, path: &Path) -> Result<Repository> {
    let expected = format!("{} ({})", location.url, location.branch);
    let repo = match Repository::open(path) {
        Ok(repo) => repo,
        Err(err) if err.code() == ErrorCode::NotFound => {
            return Err(Error::InvalidWorkingTree {
                path: path.to_path_buf(),
                expected,
                found: "no repository".into(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let url = repo
        .find_remote(ORIGIN)
        .ok()
        .and_then(|remote| remote.url().map(String::from));
    let branch = repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(String::from));

    if url.as_deref() != Some(location.url.as_str())
        || branch.as_deref() != Some(location.branch.as_str())
    {
        return Err(Error::InvalidWorkingTree {
            path: path.to_path_buf(),
            expected,
            found: format!(
                "{} ({})",
                url.as_deref().unwrap_or("no origin"),
                branch.as_deref().unwrap_or("detached")
            ),
        });
    }

    Ok(repo)
}
