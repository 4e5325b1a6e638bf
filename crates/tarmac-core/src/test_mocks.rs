//! Mock implementations for testing the merge session.
//!
//! These mocks implement the traits from tarmac-git and tarmac-review so
//! session logic can be tested without repositories or a review service.
//! Branch handles write what happens to them into a shared journal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Mutex;

use async_trait::async_trait;
use tarmac_git::{
    BranchLocation, BranchOpener, BranchOps, CommitRequest, Result as GitResult, WorkingDirPolicy,
};
use tarmac_review::{
    BranchRef, Error as ReviewError, IssueTracker, Proposal, ProposalStatus,
    Result as ReviewResult, ReviewService,
};

use crate::config::{BranchConfig, Settings};
use crate::error::{MergeError, MergeSkipError};
use crate::hooks::{Hook, HookContext, HookError, HookResult};

pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn branch(name: &str) -> BranchRef {
    BranchRef {
        identity: format!("gh:acme/widgets/{name}"),
        repository: "acme/widgets".into(),
        branch: name.into(),
        url: "https://github.com/acme/widgets.git".into(),
        web_link: format!("https://github.com/acme/widgets/tree/{name}"),
        display_name: format!("acme/widgets:{name}"),
    }
}

/// An approved proposal of `source` into `main`.
pub fn proposal(number: u64, source: &str, prerequisite: Option<&str>) -> Proposal {
    Proposal {
        number,
        web_link: format!("https://github.com/acme/widgets/pull/{number}"),
        source: branch(source),
        target: branch("main"),
        prerequisite: prerequisite.map(branch),
        status: ProposalStatus::Approved,
        reviewed_revision: Some(format!("rev-{source}")),
        commit_message: Some(format!("Land {source}")),
        description: None,
        owner: "author".into(),
        votes: Vec::new(),
    }
}

pub fn context_parts() -> (Settings, BranchConfig) {
    (Settings::default(), BranchConfig::default())
}

/// Scripted git failures.
#[derive(Debug, Clone)]
pub enum Failure {
    Conflicts(Vec<String>),
    NothingToMerge,
    OutOfDate,
    Locked,
    InvalidWorkingTree,
    RevisionNotFound,
    Unreachable,
}

impl Failure {
    fn error(&self) -> tarmac_git::Error {
        match self {
            Self::Conflicts(paths) => tarmac_git::Error::BranchHasConflicts(paths.clone()),
            Self::NothingToMerge => tarmac_git::Error::NothingToMerge,
            Self::OutOfDate => tarmac_git::Error::OutOfDate("remote moved".into()),
            Self::Locked => tarmac_git::Error::Locked("index.lock exists".into()),
            Self::InvalidWorkingTree => tarmac_git::Error::InvalidWorkingTree {
                path: "/srv/tree".into(),
                expected: "https://github.com/acme/widgets.git main".into(),
                found: "https://github.com/acme/other.git main".into(),
            },
            Self::RevisionNotFound => tarmac_git::Error::RevisionNotFound("rev".into()),
            Self::Unreachable => tarmac_git::Error::Git2(git2::Error::from_str("unreachable")),
        }
    }
}

/// What mock branches do, keyed by branch identity.
#[derive(Debug, Default)]
pub struct MockPlan {
    /// `(operation, identity)` → failure. Operations: `open`, `cleanup`,
    /// `merge` and `commit` (keyed by the source being merged), `revno`.
    failures: HashMap<(String, String), Failure>,
    /// identity → (approved revno, tip revno)
    revnos: HashMap<String, (usize, usize)>,
    authors: HashMap<String, Vec<String>>,
    fixed_issues: Vec<String>,
}

/// Opens [`MockBranch`]es that share one journal.
pub struct MockOpener {
    plan: Rc<MockPlan>,
    journal: Journal,
}

impl Default for MockOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOpener {
    pub fn new() -> Self {
        Self {
            plan: Rc::new(MockPlan::default()),
            journal: Journal::default(),
        }
    }

    fn plan_mut(&mut self) -> &mut MockPlan {
        Rc::get_mut(&mut self.plan).unwrap_or_else(|| panic!("configure the plan before opening"))
    }

    pub fn failing(mut self, operation: &str, source: &str, failure: Failure) -> Self {
        self.plan_mut()
            .failures
            .insert((operation.into(), branch(source).identity), failure);
        self
    }

    pub fn with_revnos(mut self, source: &str, approved: usize, tip: usize) -> Self {
        self.plan_mut()
            .revnos
            .insert(branch(source).identity, (approved, tip));
        self
    }

    pub fn with_authors(mut self, source: &str, authors: &[&str]) -> Self {
        self.plan_mut().authors.insert(
            branch(source).identity,
            authors.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn with_fixed_issues(mut self, issues: &[&str]) -> Self {
        self.plan_mut().fixed_issues = issues.iter().map(ToString::to_string).collect();
        self
    }

    pub fn journal(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    fn fail(&self, operation: &str, identity: &str) -> GitResult<()> {
        match self
            .plan
            .failures
            .get(&(operation.to_string(), identity.to_string()))
        {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }

    fn branch(&self, location: &BranchLocation) -> MockBranch {
        MockBranch {
            location: location.clone(),
            journal: Rc::clone(&self.journal),
            plan: Rc::clone(&self.plan),
            pending: None,
            landed: 0,
        }
    }
}

impl BranchOpener for MockOpener {
    type Branch = MockBranch;

    fn open_target(
        &self,
        location: &BranchLocation,
        policy: &WorkingDirPolicy,
    ) -> GitResult<MockBranch> {
        let kind = match policy {
            WorkingDirPolicy::Persistent(_) => "persistent",
            WorkingDirPolicy::Scratch => "scratch",
        };
        self.journal
            .borrow_mut()
            .push(format!("open target {} ({kind})", location.identity));
        self.fail("open", &location.identity)?;
        Ok(self.branch(location))
    }

    fn open_source(&self, location: &BranchLocation, _target: &MockBranch) -> GitResult<MockBranch> {
        self.journal
            .borrow_mut()
            .push(format!("open source {}", location.identity));
        self.fail("open", &location.identity)?;
        Ok(self.branch(location))
    }
}

/// Branch handle that records what happens to it.
pub struct MockBranch {
    location: BranchLocation,
    journal: Journal,
    plan: Rc<MockPlan>,
    /// Identity of the merged, uncommitted source.
    pending: Option<String>,
    landed: usize,
}

impl MockBranch {
    /// A branch with its own journal and no scripted behavior.
    pub fn detached(identity: &str) -> Self {
        Self {
            location: BranchLocation::new(identity, "https://github.com/acme/widgets.git", "main"),
            journal: Journal::default(),
            plan: Rc::new(MockPlan::default()),
            pending: None,
            landed: 0,
        }
    }

    pub fn journal(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    fn record(&self, entry: String) {
        self.journal.borrow_mut().push(entry);
    }

    fn fail(&self, operation: &str, identity: &str) -> GitResult<()> {
        match self
            .plan
            .failures
            .get(&(operation.to_string(), identity.to_string()))
        {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }
}

impl BranchOps for MockBranch {
    fn location(&self) -> &BranchLocation {
        &self.location
    }

    fn workdir(&self) -> Option<&Path> {
        None
    }

    fn cleanup(&mut self) -> GitResult<()> {
        self.record("cleanup".into());
        self.fail("cleanup", &self.location.identity)?;
        self.pending = None;
        Ok(())
    }

    fn merge(&mut self, other: &Self, to_revision: Option<&str>) -> GitResult<()> {
        let identity = &other.location.identity;
        self.record(format!(
            "merge {identity} at {}",
            to_revision.unwrap_or("tip")
        ));
        self.fail("merge", identity)?;
        self.pending = Some(identity.clone());
        Ok(())
    }

    fn commit(&mut self, request: &CommitRequest) -> GitResult<Option<String>> {
        let Some(source) = self.pending.clone() else {
            return Err(tarmac_git::Error::NoPendingMerge);
        };
        if request.reviews.iter().any(|review| review.contains('\n')) {
            return Err(tarmac_git::Error::InvalidMetadata(
                "reviews must not contain newlines".into(),
            ));
        }
        self.fail("commit", &source)?;
        if request.dry_run {
            self.record(format!("dry-run commit {}", request.message));
            return Ok(None);
        }
        self.record(format!("commit {}", request.message));
        self.pending = None;
        self.landed += 1;
        Ok(Some(format!("landed-{}", self.landed)))
    }

    fn merge_tags(&mut self, other: &Self, _dry_run: bool) -> GitResult<usize> {
        self.record(format!("tags {}", other.location.identity));
        Ok(0)
    }

    fn export_tree(&self, dest: &Path) -> GitResult<()> {
        std::fs::write(dest.join("README"), format!("{}\n", self.location.identity))?;
        Ok(())
    }

    fn authors(&self) -> GitResult<Vec<String>> {
        Ok(self
            .plan
            .authors
            .get(&self.location.identity)
            .cloned()
            .unwrap_or_default())
    }

    fn fixed_issues(&self) -> GitResult<Vec<String>> {
        Ok(self.plan.fixed_issues.clone())
    }

    fn revision_number(&self, _revision: &str) -> GitResult<usize> {
        self.fail("revno", &self.location.identity)?;
        Ok(self
            .plan
            .revnos
            .get(&self.location.identity)
            .map_or(1, |(approved, _)| *approved))
    }

    fn tip_revision_number(&self) -> GitResult<usize> {
        Ok(self
            .plan
            .revnos
            .get(&self.location.identity)
            .map_or(1, |(_, tip)| *tip))
    }

    fn last_revision(&self) -> GitResult<String> {
        Ok(format!("landed-{}", self.landed))
    }
}

/// Review service backed by fixed proposals; records every mutation.
#[derive(Default)]
pub struct MockReview {
    branches: Vec<BranchRef>,
    candidates: Vec<Proposal>,
    /// prerequisite identity → proposals of it
    landings: HashMap<String, Vec<Proposal>>,
    pub comments: Mutex<Vec<(u64, String, String)>>,
    pub statuses: Mutex<Vec<(u64, String)>>,
    pub saves: Mutex<Vec<u64>>,
    pub fixes: Mutex<Vec<(String, String, String)>>,
}

impl MockReview {
    pub fn with_target(mut self, name: &str) -> Self {
        self.branches.push(branch(name));
        self
    }

    pub fn with_candidate(mut self, proposal: Proposal) -> Self {
        self.candidates.push(proposal);
        self
    }

    /// Register `proposal` as a landing of its source branch.
    pub fn with_landing(mut self, proposal: Proposal) -> Self {
        self.landings
            .entry(proposal.source.identity.clone())
            .or_default()
            .push(proposal);
        self
    }

    pub fn comments(&self) -> Vec<(u64, String, String)> {
        self.comments.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<(u64, String)> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn saves(&self) -> Vec<u64> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReviewService for MockReview {
    async fn find_branch(&self, url: &str) -> ReviewResult<Option<BranchRef>> {
        Ok(self.branches.iter().find(|b| b.identity == url).cloned())
    }

    async fn candidate_proposals(&self, target: &BranchRef) -> ReviewResult<Vec<Proposal>> {
        Ok(self
            .candidates
            .iter()
            .filter(|p| p.target.identity == target.identity)
            .cloned()
            .collect())
    }

    async fn prerequisite_proposals(&self, proposal: &Proposal) -> ReviewResult<Vec<Proposal>> {
        Ok(proposal
            .prerequisite
            .as_ref()
            .and_then(|prerequisite| self.landings.get(&prerequisite.identity))
            .cloned()
            .unwrap_or_default())
    }

    async fn post_comment(&self, proposal: &Proposal, subject: &str, body: &str) -> ReviewResult<()> {
        if let Ok(mut comments) = self.comments.lock() {
            comments.push((proposal.number, subject.into(), body.into()));
        }
        Ok(())
    }

    async fn set_status(&self, proposal: &Proposal, status: &ProposalStatus) -> ReviewResult<()> {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push((proposal.number, status.to_string()));
        }
        Ok(())
    }

    async fn save(&self, proposal: &Proposal) -> ReviewResult<()> {
        if let Ok(mut saves) = self.saves.lock() {
            saves.push(proposal.number);
        }
        Ok(())
    }

    async fn load_by_url(&self, url: &str) -> ReviewResult<Proposal> {
        self.candidates
            .iter()
            .find(|p| p.web_link == url)
            .cloned()
            .ok_or_else(|| ReviewError::InvalidProposalUrl(url.into()))
    }
}

#[async_trait]
impl IssueTracker for MockReview {
    async fn mark_fix_committed(
        &self,
        target: &BranchRef,
        issue: &str,
        revision: &str,
        label: &str,
    ) -> ReviewResult<()> {
        if issue == "broken" {
            return Err(ReviewError::InvalidIssue(issue.into()));
        }
        if let Ok(mut fixes) = self.fixes.lock() {
            fixes.push((
                format!("{}#{issue}", target.repository),
                revision.into(),
                label.into(),
            ));
        }
        Ok(())
    }
}

enum Outcome {
    Pass,
    Veto(MergeError),
    Skip(MergeSkipError),
    Fail(String),
}

/// Hook that journals each call and returns a scripted result.
pub struct RecordingHook {
    name: String,
    journal: Journal,
    outcome: Outcome,
}

impl RecordingHook {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: Rc::clone(journal),
            outcome: Outcome::Pass,
        }
    }

    pub fn vetoing(mut self, err: MergeError) -> Self {
        self.outcome = Outcome::Veto(err);
        self
    }

    pub fn skipping(mut self, message: &str) -> Self {
        self.outcome = Outcome::Skip(MergeSkipError::new(message));
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.outcome = Outcome::Fail(message.into());
        self
    }

    fn called(&self, entry: String) -> HookResult {
        self.journal
            .borrow_mut()
            .push(format!("hook {} {entry}", self.name));
        match &self.outcome {
            Outcome::Pass => Ok(()),
            Outcome::Veto(err) => Err(HookError::Vetoed(err.clone())),
            Outcome::Skip(err) => Err(HookError::Skipped(err.clone())),
            Outcome::Fail(message) => Err(HookError::Failed(anyhow::anyhow!(message.clone()))),
        }
    }
}

#[async_trait(?Send)]
impl<B: BranchOps> Hook<B> for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_merge(&self, _ctx: &HookContext<'_>, _target: &B) -> HookResult {
        self.called("pre-merge".into())
    }

    async fn pre_commit(
        &self,
        _ctx: &HookContext<'_>,
        _target: &B,
        _source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        self.called(format!("pre-commit #{}", proposal.number))
    }

    async fn post_commit(
        &self,
        _ctx: &HookContext<'_>,
        _target: &B,
        _source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        self.called(format!("post-commit #{}", proposal.number))
    }

    async fn post_merge(&self, _ctx: &HookContext<'_>, _target: &B, landed: usize) -> HookResult {
        self.called(format!("post-merge {landed}"))
    }
}
