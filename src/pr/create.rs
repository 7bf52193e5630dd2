use tracing::{debug, info, instrument, warn};

use super::client::AdoClient;
use super::fetch::git_path;
use super::types::{CreatedPr, NewPullRequest, RepoRef};
use super::{wire, PrError};

const OP: &str = "create_pr";

impl AdoClient {
    /// Create a pull request after checking both branches exist.
    ///
    /// Reviewers are resolved to identity ids where the identity search
    /// finds them; the rest are passed by display name.
    #[instrument(
        skip(self, request),
        fields(repo = %repo, source = %request.source_branch, target = %request.target_branch)
    )]
    pub async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
    ) -> Result<CreatedPr, PrError> {
        let title = request.title.trim();
        let source = branch_short_name(&request.source_branch);
        let target = branch_short_name(&request.target_branch);
        if title.is_empty() {
            return Err(PrError::validation(OP, "title must not be empty"));
        }
        if source.is_empty() || target.is_empty() {
            return Err(PrError::validation(OP, "source and target branches are required"));
        }
        if source == target {
            return Err(PrError::validation(
                OP,
                format!("source and target branch are both '{}'", source),
            ));
        }

        self.ensure_branch(repo, source).await?;
        self.ensure_branch(repo, target).await?;

        let mut reviewers = Vec::with_capacity(request.reviewers.len());
        for reviewer in request.reviewers.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
            reviewers.push(self.resolve_reviewer(repo, reviewer).await?);
        }

        let body = wire::NewPullRequestBody {
            source_ref_name: format!("refs/heads/{}", source),
            target_ref_name: format!("refs/heads/{}", target),
            title: title.to_string(),
            description: request.description.clone().unwrap_or_default(),
            is_draft: request.draft,
            reviewers,
            work_item_refs: request
                .work_items
                .iter()
                .map(|id| wire::WorkItemRef { id: id.trim().to_string() })
                .filter(|item| !item.id.is_empty())
                .collect(),
            completion_options: request.auto_complete.then(|| wire::CompletionOptions {
                delete_source_branch: true,
                merge_commit_message: format!("Merge pull request: {}", title),
                squash_merge: false,
            }),
        };

        let url = self.api_url(
            &repo.organization,
            &git_path(&repo.project, &repo.repository, &["pullrequests"]),
            &[],
        )?;
        let created: wire::CreatedPullRequest = self
            .post_json(OP, &format!("repository {}", repo), url, &body)
            .await?;

        let id = created.pull_request_id.to_string();
        let web_url = self.web_url(
            &repo.organization,
            &[repo.project.as_str(), "_git", &repo.repository, "pullrequest", &id],
        )?;
        info!(pr = created.pull_request_id, "created pull request");

        Ok(CreatedPr {
            id: created.pull_request_id,
            title: created.title,
            url: web_url.to_string(),
            source_branch: source.to_string(),
            target_branch: target.to_string(),
            is_draft: created.is_draft,
        })
    }

    /// NotFound unless `refs/heads/{branch}` exists. The refs filter is a
    /// prefix match, so the exact name is checked.
    async fn ensure_branch(&self, repo: &RepoRef, branch: &str) -> Result<(), PrError> {
        let filter = format!("heads/{}", branch);
        let url = self.api_url(
            &repo.organization,
            &git_path(&repo.project, &repo.repository, &["refs"]),
            &[("filter", &filter)],
        )?;
        let what = format!("branch '{}' in {}", branch, repo);
        let refs: wire::ValueList<wire::GitRef> = self.get_json(OP, &what, url).await?;

        let full_name = format!("refs/heads/{}", branch);
        if refs.value.iter().any(|r| r.name == full_name) {
            debug!(branch, "branch exists");
            Ok(())
        } else {
            Err(PrError::NotFound { operation: OP, what })
        }
    }

    async fn resolve_reviewer(
        &self,
        repo: &RepoRef,
        reviewer: &str,
    ) -> Result<wire::ReviewerRef, PrError> {
        let url = self.api_url(
            &repo.organization,
            &["_apis", "identities"],
            &[("searchFilter", "General"), ("filterValue", reviewer)],
        )?;
        let found: Result<wire::ValueList<wire::IdentityMatch>, PrError> = self
            .get_json(OP, &format!("identity '{}'", reviewer), url)
            .await;
        match found {
            Ok(list) => match list.value.into_iter().next() {
                Some(identity) => Ok(wire::ReviewerRef::Id(identity.id)),
                None => {
                    warn!(reviewer, "no identity found; passing display name");
                    Ok(wire::ReviewerRef::DisplayName(reviewer.to_string()))
                }
            },
            Err(err @ PrError::Unauthenticated(_)) => Err(err),
            Err(err) => {
                warn!(reviewer, error = %err, "identity search failed; passing display name");
                Ok(wire::ReviewerRef::DisplayName(reviewer.to_string()))
            }
        }
    }
}

fn branch_short_name(branch: &str) -> &str {
    let branch = branch.trim();
    branch.strip_prefix("refs/heads/").unwrap_or(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::client::tests::{api_mock, test_client};
    use mockito::Matcher;
    use serde_json::json;

    const REPO_PATH: &str = "/org/proj/_apis/git/repositories/repo";

    fn repo() -> RepoRef {
        RepoRef {
            organization: "org".to_string(),
            project: "proj".to_string(),
            repository: "repo".to_string(),
        }
    }

    fn request() -> NewPullRequest {
        NewPullRequest {
            source_branch: "feature/login".to_string(),
            target_branch: "main".to_string(),
            title: "Add login".to_string(),
            ..Default::default()
        }
    }

    async fn mock_branch(
        server: &mut mockito::ServerGuard,
        branch: &str,
        exists: bool,
    ) -> mockito::Mock {
        let body = if exists {
            json!({
                "value": [{"name": format!("refs/heads/{branch}"), "objectId": "abc"}],
                "count": 1
            })
        } else {
            json!({"value": [], "count": 0})
        };
        server
            .mock("GET", format!("{REPO_PATH}/refs").as_str())
            .match_query(Matcher::UrlEncoded("filter".into(), format!("heads/{branch}")))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_create_pull_request() {
        let mut server = mockito::Server::new_async().await;
        let _source = mock_branch(&mut server, "feature/login", true).await;
        let _target = mock_branch(&mut server, "main", true).await;
        let _bob = server
            .mock("GET", "/org/_apis/identities")
            .match_query(Matcher::UrlEncoded("filterValue".into(), "bob@example.com".into()))
            .with_status(200)
            .with_body(r#"{"count":1,"value":[{"id":"bob-guid"}]}"#)
            .create_async()
            .await;
        let _ghost = server
            .mock("GET", "/org/_apis/identities")
            .match_query(Matcher::UrlEncoded("filterValue".into(), "ghost".into()))
            .with_status(200)
            .with_body(r#"{"count":0,"value":[]}"#)
            .create_async()
            .await;
        let post = api_mock(&mut server, "POST", &format!("{REPO_PATH}/pullrequests"))
            .match_body(Matcher::Json(json!({
                "sourceRefName": "refs/heads/feature/login",
                "targetRefName": "refs/heads/main",
                "title": "Add login",
                "description": "",
                "isDraft": true,
                "reviewers": [{"id": "bob-guid"}, {"displayName": "ghost"}],
                "workItemRefs": [{"id": "123"}],
                "completionOptions": {
                    "deleteSourceBranch": true,
                    "mergeCommitMessage": "Merge pull request: Add login",
                    "squashMerge": false
                }
            })))
            .with_status(201)
            .with_body(r#"{"pullRequestId":101,"title":"Add login","isDraft":true}"#)
            .create_async()
            .await;

        let mut req = request();
        req.reviewers = vec!["bob@example.com".to_string(), "ghost".to_string()];
        req.work_items = vec!["123".to_string()];
        req.auto_complete = true;
        req.draft = true;

        let client = test_client(&server.url());
        let created = client.create_pull_request(&repo(), &req).await.unwrap();
        assert_eq!(created.id, 101);
        assert!(created.is_draft);
        assert_eq!(
            created.url,
            format!("{}/org/proj/_git/repo/pullrequest/101", server.url())
        );
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_pull_request_missing_branch() {
        let mut server = mockito::Server::new_async().await;
        let _source = mock_branch(&mut server, "feature/login", false).await;
        let post = api_mock(&mut server, "POST", &format!("{REPO_PATH}/pullrequests"))
            .expect(0)
            .create_async()
            .await;

        let err = test_client(&server.url())
            .create_pull_request(&repo(), &request())
            .await
            .unwrap_err();
        match err {
            PrError::NotFound { what, .. } => assert!(what.contains("feature/login")),
            other => panic!("unexpected error: {other:?}"),
        }
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_branch_prefix_is_not_a_match() {
        let mut server = mockito::Server::new_async().await;
        // Filter heads/main also returns heads/main-old.
        let _refs = server
            .mock("GET", format!("{REPO_PATH}/refs").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[{"name":"refs/heads/main-old"}]}"#)
            .create_async()
            .await;

        let err = test_client(&server.url())
            .ensure_branch(&repo(), "main")
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_pull_request_validation() {
        let client = test_client("http://127.0.0.1:9");
        let mut req = request();
        req.title = " ".to_string();
        assert_eq!(
            client.create_pull_request(&repo(), &req).await.unwrap_err().kind(),
            "ValidationError"
        );

        let mut req = request();
        req.target_branch = "refs/heads/feature/login".to_string();
        assert_eq!(
            client.create_pull_request(&repo(), &req).await.unwrap_err().kind(),
            "ValidationError"
        );
    }
}
