//! GitHub API client.
//!
//! Maps pull requests onto merge proposals: the base branch is the
//! target, the head branch is the source, reviews become votes, and a
//! `tarmac: <status>` label carries status changes made by Tarmac.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::Auth;
use crate::error::{Error, Result};
use crate::traits::{IssueTracker, ReviewService};
use crate::types::{BranchRef, Proposal, ProposalStatus, Vote};

/// Prefix of labels that carry a proposal status.
pub const STATUS_LABEL_PREFIX: &str = "tarmac: ";

/// Body line naming a proposal's prerequisite branch.
const PREREQUISITE_MARKER: &str = "Prerequisite:";

// === Internal API response types ===

#[derive(serde::Deserialize)]
struct ApiBranch {
    name: String,
}

/// Internal representation of a PR from the GitHub API.
#[derive(serde::Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    /// Only present on single-PR responses; lists carry `merged_at`.
    #[serde(default)]
    merged: bool,
    merged_at: Option<String>,
    #[serde(default)]
    draft: bool,
    html_url: String,
    user: Option<ApiUser>,
    head: ApiRef,
    base: ApiRef,
    #[serde(default)]
    labels: Vec<ApiLabel>,
}

#[derive(serde::Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    ref_name: String,
    /// `None` when the head repository was deleted.
    repo: Option<ApiRepo>,
}

#[derive(serde::Deserialize)]
struct ApiRepo {
    full_name: String,
}

#[derive(serde::Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(serde::Deserialize, serde::Serialize)]
struct ApiLabel {
    name: String,
}

#[derive(serde::Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    state: String,
    commit_id: Option<String>,
    body: Option<String>,
}

/// Latest review state per reviewer.
#[derive(Debug, Default)]
struct ReviewSummary {
    votes: Vec<Vote>,
    approved_revision: Option<String>,
    approvals: usize,
    change_requests: usize,
}

impl ReviewSummary {
    fn from_reviews(reviews: Vec<ApiReview>) -> Self {
        // (login, position in the review stream, review)
        let mut latest: Vec<(String, usize, ApiReview)> = Vec::new();
        for (position, review) in reviews.into_iter().enumerate() {
            let Some(login) = review.user.as_ref().map(|user| user.login.clone()) else {
                continue;
            };
            // Plain comments do not change a reviewer's verdict.
            if !matches!(
                review.state.as_str(),
                "APPROVED" | "CHANGES_REQUESTED" | "DISMISSED"
            ) {
                continue;
            }
            match latest.iter_mut().find(|(name, _, _)| *name == login) {
                Some(slot) => *slot = (login, position, review),
                None => latest.push((login, position, review)),
            }
        }

        let mut summary = Self::default();
        let mut newest_approval = None;
        for (login, position, review) in latest {
            let value = match review.state.as_str() {
                "APPROVED" => {
                    summary.approvals += 1;
                    if newest_approval.is_none_or(|newest| position > newest) {
                        newest_approval = Some(position);
                        summary.approved_revision.clone_from(&review.commit_id);
                    }
                    "Approve"
                }
                "CHANGES_REQUESTED" => {
                    summary.change_requests += 1;
                    "Needs Fixing"
                }
                _ => continue,
            };
            summary.votes.push(Vote {
                reviewer: login,
                value: Some(value.to_string()),
                comment: review.body.filter(|body| !body.trim().is_empty()),
            });
        }
        summary
    }
}

/// Status of a pull request as a proposal status.
fn derive_status(pr: &ApiPullRequest, reviews: &ReviewSummary) -> ProposalStatus {
    if pr.merged || pr.merged_at.is_some() {
        return ProposalStatus::Merged;
    }
    if pr.state != "open" {
        return ProposalStatus::Superseded;
    }
    if let Some(status) = pr
        .labels
        .iter()
        .find_map(|label| label.name.strip_prefix(STATUS_LABEL_PREFIX))
    {
        return ProposalStatus::from(status);
    }
    if pr.draft {
        return ProposalStatus::WorkInProgress;
    }
    if reviews.approvals > 0 && reviews.change_requests == 0 {
        ProposalStatus::Approved
    } else {
        ProposalStatus::NeedsReview
    }
}

/// Prerequisite named in a PR body: `(repository, branch)`.
///
/// Accepts `Prerequisite: <branch>` and `Prerequisite: <owner>/<repo>:<branch>`.
fn parse_prerequisite(body: Option<&str>) -> Option<(Option<String>, String)> {
    let value = body?
        .lines()
        .find_map(|line| line.trim().strip_prefix(PREREQUISITE_MARKER))?
        .trim();
    if value.is_empty() {
        return None;
    }
    match value.split_once(':') {
        Some((repository, branch)) if repository.contains('/') => {
            Some((Some(repository.to_string()), branch.to_string()))
        }
        _ => Some((None, value.to_string())),
    }
}

/// Split `gh:<owner>/<repo>/<branch>` into repository and branch.
///
/// # Errors
/// Returns `InvalidBranchUrl` for anything else.
pub fn parse_branch_url(url: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidBranchUrl(url.to_string());
    let rest = url.strip_prefix("gh:").ok_or_else(invalid)?;
    let mut parts = rest.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), Some(branch))
            if !owner.is_empty() && !repo.is_empty() && !branch.is_empty() =>
        {
            Ok((format!("{owner}/{repo}"), branch.to_string()))
        }
        _ => Err(invalid()),
    }
}

/// Split `https://<host>/<owner>/<repo>/pull/<n>` into repository and number.
fn parse_proposal_url(url: &str) -> Result<(String, u64)> {
    let invalid = || Error::InvalidProposalUrl(url.to_string());
    let path = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .trim_end_matches('/');
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [_host, owner, repo, "pull" | "pulls", number, ..] => {
            let number = number.parse().map_err(|_| invalid())?;
            Ok((format!("{owner}/{repo}"), number))
        }
        _ => Err(invalid()),
    }
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    web_url: String,
    /// Token stored as `SecretString` for automatic zeroization on drop.
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Default GitHub web URL, used for clone URLs and links.
    pub const DEFAULT_WEB_URL: &'static str = "https://github.com";

    /// Create a new GitHub client.
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn new(auth: &Auth) -> Result<Self> {
        Self::with_base_url(auth, Self::DEFAULT_API_URL)
    }

    /// Create a new GitHub client with a custom API URL (for GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if authentication fails.
    pub fn with_base_url(auth: &Auth, base_url: impl Into<String>) -> Result<Self> {
        let token = auth.resolve()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("tarmac"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            web_url: Self::DEFAULT_WEB_URL.to_string(),
            token,
        })
    }

    /// Use a different web URL for clone URLs and links.
    #[must_use]
    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = web_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Token this client authenticates with, for reuse by git.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Build the branch reference for `branch` in `repository`.
    #[must_use]
    pub fn branch_ref(&self, repository: &str, branch: &str) -> BranchRef {
        BranchRef {
            identity: format!("gh:{repository}/{branch}"),
            repository: repository.to_string(),
            branch: branch.to_string(),
            url: format!("{}/{repository}.git", self.web_url),
            web_link: format!("{}/{repository}/tree/{branch}", self.web_url),
            display_name: format!("{repository}:{branch}"),
        }
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Make a GET request.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Make a GET request where 404 means "absent".
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::ApiError { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Make a POST request.
    async fn post<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.authorization())
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Make a DELETE request.
    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    /// Handle API response.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if response.status().is_success() {
            let body = response.json().await?;
            return Ok(body);
        }
        Err(Self::api_error(response).await)
    }

    async fn api_error(response: reqwest::Response) -> Error {
        let status_code = response.status().as_u16();
        match status_code {
            401 => Error::AuthenticationFailed,
            403 if response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v == "0") =>
            {
                Error::RateLimited
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Error::ApiError {
                    status: status_code,
                    message: text,
                }
            }
        }
    }

    // === Proposal mapping ===

    async fn reviews(&self, repository: &str, number: u64) -> Result<Vec<ApiReview>> {
        self.get(&format!(
            "/repos/{repository}/pulls/{number}/reviews?per_page=100"
        ))
        .await
    }

    /// Turn a pull request in `repository` into a proposal.
    async fn to_proposal(&self, pr: ApiPullRequest, repository: &str) -> Result<Proposal> {
        // Reviews only matter while a proposal can still land.
        let reviews = if pr.state == "open" {
            ReviewSummary::from_reviews(self.reviews(repository, pr.number).await?)
        } else {
            ReviewSummary::default()
        };
        let status = derive_status(&pr, &reviews);

        let source_repository = pr
            .head
            .repo
            .as_ref()
            .map_or(repository, |repo| repo.full_name.as_str())
            .to_string();
        let prerequisite = parse_prerequisite(pr.body.as_deref()).map(|(repo, branch)| {
            self.branch_ref(repo.as_deref().unwrap_or(&source_repository), &branch)
        });

        Ok(Proposal {
            number: pr.number,
            web_link: pr.html_url,
            source: self.branch_ref(&source_repository, &pr.head.ref_name),
            target: self.branch_ref(repository, &pr.base.ref_name),
            prerequisite,
            status,
            reviewed_revision: reviews.approved_revision,
            commit_message: Some(pr.title).filter(|title| !title.trim().is_empty()),
            description: pr.body.filter(|body| !body.trim().is_empty()),
            owner: pr.user.map(|user| user.login).unwrap_or_default(),
            votes: reviews.votes,
        })
    }

    async fn to_proposals(&self, prs: Vec<ApiPullRequest>, repository: &str) -> Result<Vec<Proposal>> {
        let mut proposals = Vec::with_capacity(prs.len());
        for pr in prs {
            proposals.push(self.to_proposal(pr, repository).await?);
        }
        Ok(proposals)
    }

    async fn post_issue_comment(&self, repository: &str, number: u64, body: String) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("/repos/{repository}/issues/{number}/comments"),
                &serde_json::json!({ "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn add_label(&self, repository: &str, number: u64, label: &str) -> Result<()> {
        let _: Vec<ApiLabel> = self
            .post(
                &format!("/repos/{repository}/issues/{number}/labels"),
                &serde_json::json!({ "labels": [label] }),
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("web_url", &self.web_url)
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReviewService for GitHubClient {
    async fn find_branch(&self, url: &str) -> Result<Option<BranchRef>> {
        let (repository, branch) = parse_branch_url(url)?;
        let found: Option<ApiBranch> = self
            .get_optional(&format!(
                "/repos/{repository}/branches/{}",
                urlencoding::encode(&branch)
            ))
            .await?;
        Ok(found.map(|found| self.branch_ref(&repository, &found.name)))
    }

    async fn candidate_proposals(&self, target: &BranchRef) -> Result<Vec<Proposal>> {
        let prs: Vec<ApiPullRequest> = self
            .get(&format!(
                "/repos/{}/pulls?state=open&base={}&per_page=100",
                target.repository,
                urlencoding::encode(&target.branch)
            ))
            .await?;
        debug!(target = %target.identity, count = prs.len(), "fetched open pull requests");
        self.to_proposals(prs, &target.repository).await
    }

    async fn prerequisite_proposals(&self, proposal: &Proposal) -> Result<Vec<Proposal>> {
        let Some(prerequisite) = &proposal.prerequisite else {
            return Ok(Vec::new());
        };
        let repository = &proposal.target.repository;
        let prs: Vec<ApiPullRequest> = self
            .get(&format!(
                "/repos/{repository}/pulls?state=all&head={}:{}&per_page=100",
                prerequisite.owner(),
                urlencoding::encode(&prerequisite.branch)
            ))
            .await?;
        self.to_proposals(prs, repository).await
    }

    async fn post_comment(&self, proposal: &Proposal, subject: &str, body: &str) -> Result<()> {
        self.post_issue_comment(
            &proposal.target.repository,
            proposal.number,
            format!("**{subject}**\n\n{body}"),
        )
        .await
    }

    async fn set_status(&self, proposal: &Proposal, status: &ProposalStatus) -> Result<()> {
        let repository = &proposal.target.repository;
        let number = proposal.number;
        let wanted = format!("{STATUS_LABEL_PREFIX}{status}");

        let labels: Vec<ApiLabel> = self
            .get(&format!("/repos/{repository}/issues/{number}/labels"))
            .await?;
        for label in labels
            .iter()
            .filter(|label| label.name.starts_with(STATUS_LABEL_PREFIX) && label.name != wanted)
        {
            self.delete(&format!(
                "/repos/{repository}/issues/{number}/labels/{}",
                urlencoding::encode(&label.name)
            ))
            .await?;
        }

        self.add_label(repository, number, &wanted).await
    }

    async fn save(&self, proposal: &Proposal) -> Result<()> {
        // GitHub applies comments and labels immediately.
        debug!(proposal = %proposal.web_link, "nothing to save");
        Ok(())
    }

    async fn load_by_url(&self, url: &str) -> Result<Proposal> {
        let (repository, number) = parse_proposal_url(url)?;
        let pr: ApiPullRequest = self
            .get(&format!("/repos/{repository}/pulls/{number}"))
            .await?;
        self.to_proposal(pr, &repository).await
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn mark_fix_committed(
        &self,
        target: &BranchRef,
        issue: &str,
        revision: &str,
        label: &str,
    ) -> Result<()> {
        let number: u64 = issue
            .trim_start_matches('#')
            .parse()
            .map_err(|_| Error::InvalidIssue(issue.to_string()))?;

        self.post_issue_comment(
            &target.repository,
            number,
            format!("Fix committed to {} in {revision}.", target.display_name),
        )
        .await?;
        self.add_label(&target.repository, number, label).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Create a test client pointing to the mock server.
    fn test_client(base_url: &str) -> GitHubClient {
        let auth = Auth::Token(SecretString::from("test-token"));
        GitHubClient::with_base_url(&auth, base_url).unwrap()
    }

    fn pr_json(number: u64, head: &str, state: &str) -> serde_json::Value {
        serde_json::json!({
            "number": number,
            "title": format!("Land {head}"),
            "body": "Adds a thing.",
            "state": state,
            "merged_at": null,
            "draft": false,
            "html_url": format!("https://github.com/acme/widgets/pull/{number}"),
            "user": { "login": "author" },
            "head": { "ref": head, "repo": { "full_name": "acme/widgets" } },
            "base": { "ref": "main", "repo": { "full_name": "acme/widgets" } },
            "labels": []
        })
    }

    fn review_json(login: &str, state: &str, commit: &str) -> serde_json::Value {
        serde_json::json!({
            "user": { "login": login },
            "state": state,
            "commit_id": commit,
            "body": ""
        })
    }

    async fn mount_reviews(server: &MockServer, number: u64, reviews: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/widgets/pulls/{number}/reviews")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reviews))
            .mount(server)
            .await;
    }

    fn main_ref(client: &GitHubClient) -> BranchRef {
        client.branch_ref("acme/widgets", "main")
    }

    // === URL parsing ===

    #[test]
    fn test_parse_branch_url() {
        assert_eq!(
            parse_branch_url("gh:acme/widgets/feature/x").unwrap(),
            ("acme/widgets".to_string(), "feature/x".to_string())
        );
        assert!(matches!(
            parse_branch_url("lp:widgets"),
            Err(Error::InvalidBranchUrl(_))
        ));
        assert!(matches!(
            parse_branch_url("gh:acme/widgets"),
            Err(Error::InvalidBranchUrl(_))
        ));
    }

    #[test]
    fn test_parse_proposal_url() {
        assert_eq!(
            parse_proposal_url("https://github.com/acme/widgets/pull/17").unwrap(),
            ("acme/widgets".to_string(), 17)
        );
        assert_eq!(
            parse_proposal_url("https://github.com/acme/widgets/pull/17/files").unwrap(),
            ("acme/widgets".to_string(), 17)
        );
        assert!(parse_proposal_url("https://github.com/acme/widgets").is_err());
    }

    #[test]
    fn test_parse_prerequisite() {
        assert_eq!(
            parse_prerequisite(Some("Builds on stuff.\n\nPrerequisite: feature/base\n")),
            Some((None, "feature/base".to_string()))
        );
        assert_eq!(
            parse_prerequisite(Some("Prerequisite: fork/widgets:base")),
            Some((Some("fork/widgets".to_string()), "base".to_string()))
        );
        assert_eq!(parse_prerequisite(Some("No dependencies")), None);
        assert_eq!(parse_prerequisite(None), None);
    }

    #[test]
    fn test_branch_ref_uses_web_url() {
        let client = test_client("http://localhost").with_web_url("https://git.example.com/");
        let branch = client.branch_ref("acme/widgets", "main");
        assert_eq!(branch.identity, "gh:acme/widgets/main");
        assert_eq!(branch.url, "https://git.example.com/acme/widgets.git");
        assert_eq!(branch.display_name, "acme/widgets:main");
    }

    // === Review summaries ===

    #[test]
    fn test_latest_review_per_reviewer_wins() {
        let reviews: Vec<ApiReview> = serde_json::from_value(serde_json::json!([
            review_json("alice", "CHANGES_REQUESTED", "aaa"),
            review_json("bob", "APPROVED", "aaa"),
            review_json("alice", "COMMENTED", "bbb"),
            review_json("alice", "APPROVED", "bbb"),
        ]))
        .unwrap();

        let summary = ReviewSummary::from_reviews(reviews);
        assert_eq!(summary.approvals, 2);
        assert_eq!(summary.change_requests, 0);
        assert_eq!(summary.approved_revision.as_deref(), Some("bbb"));
        assert_eq!(summary.votes.len(), 2);
        assert_eq!(summary.votes[0].reviewer, "alice");
        assert_eq!(summary.votes[0].value.as_deref(), Some("Approve"));
    }

    #[test]
    fn test_dismissed_review_drops_vote() {
        let reviews: Vec<ApiReview> = serde_json::from_value(serde_json::json!([
            review_json("alice", "APPROVED", "aaa"),
            review_json("alice", "DISMISSED", "aaa"),
        ]))
        .unwrap();

        let summary = ReviewSummary::from_reviews(reviews);
        assert_eq!(summary.approvals, 0);
        assert!(summary.votes.is_empty());
        assert!(summary.approved_revision.is_none());
    }

    // === ReviewService ===

    #[tokio::test]
    async fn test_find_branch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/branches/main"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "main" })),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/branches/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Branch not found"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let branch = client
            .find_branch("gh:acme/widgets/main")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(branch.repository, "acme/widgets");
        assert_eq!(branch.url, "https://github.com/acme/widgets.git");

        assert!(
            client
                .find_branch("gh:acme/widgets/gone")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_candidate_proposals() {
        let mock_server = MockServer::start().await;

        let mut labelled = pr_json(2, "labelled", "open");
        labelled["labels"] = serde_json::json!([{ "name": "tarmac: Needs review" }]);
        let mut dependent = pr_json(3, "dependent", "open");
        dependent["body"] = serde_json::json!("Stacked.\n\nPrerequisite: approved");

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls"))
            .and(query_param("state", "open"))
            .and(query_param("base", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                pr_json(1, "approved", "open"),
                labelled,
                dependent,
            ])))
            .mount(&mock_server)
            .await;
        for number in 1..=3 {
            mount_reviews(
                &mock_server,
                number,
                serde_json::json!([review_json("reviewer", "APPROVED", "abc123")]),
            )
            .await;
        }

        let client = test_client(&mock_server.uri());
        let proposals = client
            .candidate_proposals(&main_ref(&client))
            .await
            .unwrap();

        assert_eq!(proposals.len(), 3);
        let first = &proposals[0];
        assert_eq!(first.status, ProposalStatus::Approved);
        assert_eq!(first.reviewed_revision.as_deref(), Some("abc123"));
        assert_eq!(first.commit_message.as_deref(), Some("Land approved"));
        assert_eq!(first.source.identity, "gh:acme/widgets/approved");
        assert_eq!(first.target.identity, "gh:acme/widgets/main");
        assert_eq!(first.reviews(), vec!["reviewer;Approve"]);
        assert_eq!(first.owner, "author");

        assert_eq!(proposals[1].status, ProposalStatus::NeedsReview);
        assert_eq!(
            proposals[2]
                .prerequisite
                .as_ref()
                .map(|branch| branch.identity.as_str()),
            Some("gh:acme/widgets/approved")
        );
    }

    #[tokio::test]
    async fn test_prerequisite_proposals() {
        let mock_server = MockServer::start().await;

        let mut merged = pr_json(5, "base", "closed");
        merged["merged_at"] = serde_json::json!("2024-01-01T00:00:00Z");

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls"))
            .and(query_param("state", "all"))
            .and(query_param("head", "acme:base"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                merged,
                pr_json(6, "base", "closed"),
            ])))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let mut proposal = client_proposal(&client);
        proposal.prerequisite = Some(client.branch_ref("acme/widgets", "base"));

        let found = client.prerequisite_proposals(&proposal).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].status, ProposalStatus::Merged);
        assert_eq!(found[1].status, ProposalStatus::Superseded);

        proposal.prerequisite = None;
        assert!(
            client
                .prerequisite_proposals(&proposal)
                .await
                .unwrap()
                .is_empty()
        );
    }

    fn client_proposal(client: &GitHubClient) -> Proposal {
        Proposal {
            number: 9,
            web_link: "https://github.com/acme/widgets/pull/9".into(),
            source: client.branch_ref("acme/widgets", "feature"),
            target: main_ref(client),
            prerequisite: None,
            status: ProposalStatus::Approved,
            reviewed_revision: Some("abc".into()),
            commit_message: Some("Feature".into()),
            description: None,
            owner: "author".into(),
            votes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_post_comment() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/9/comments"))
            .and(body_json(serde_json::json!({
                "body": "**Re: [Merge] feature into main**\n\nIt broke."
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 1 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        client
            .post_comment(
                &client_proposal(&client),
                "Re: [Merge] feature into main",
                "It broke.",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_status_replaces_status_labels() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/9/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "tarmac: Approved" },
                { "name": "bug" }
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widgets/issues/9/labels/tarmac%3A%20Approved"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/9/labels"))
            .and(body_json(serde_json::json!({ "labels": ["tarmac: Needs review"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "tarmac: Needs review" }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        client
            .set_status(&client_proposal(&client), &ProposalStatus::NeedsReview)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_by_url() {
        let mock_server = MockServer::start().await;

        let mut pr = pr_json(17, "feature", "open");
        pr["merged"] = serde_json::json!(false);
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/17"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pr))
            .mount(&mock_server)
            .await;
        mount_reviews(&mock_server, 17, serde_json::json!([])).await;

        let client = test_client(&mock_server.uri());
        let proposal = client
            .load_by_url("https://github.com/acme/widgets/pull/17")
            .await
            .unwrap();
        assert_eq!(proposal.number, 17);
        assert_eq!(proposal.status, ProposalStatus::NeedsReview);
        assert!(proposal.reviewed_revision.is_none());
    }

    #[tokio::test]
    async fn test_mark_fix_committed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/12/comments"))
            .and(body_json(serde_json::json!({
                "body": "Fix committed to acme/widgets:main in abc123."
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 3 })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/12/labels"))
            .and(body_json(serde_json::json!({ "labels": ["fix-committed"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let target = main_ref(&client);
        client
            .mark_fix_committed(&target, "12", "abc123", "fix-committed")
            .await
            .unwrap();

        assert!(matches!(
            client
                .mark_fix_committed(&target, "PROJ-1", "abc123", "fix-committed")
                .await,
            Err(Error::InvalidIssue(_))
        ));
    }

    // === Error mapping ===

    #[tokio::test]
    async fn test_unauthorized_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/branches/main"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "Bad credentials"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client.find_branch("gh:acme/widgets/main").await;

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_rate_limited_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_json(serde_json::json!({
                        "message": "API rate limit exceeded"
                    })),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client.candidate_proposals(&main_ref(&client)).await;

        assert!(matches!(result, Err(Error::RateLimited)));
    }
}
