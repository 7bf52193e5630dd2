use base64::Engine;
use tracing::{debug, instrument};

use super::client::AdoClient;
use super::types::{ChangeType, FileChange, PrInfo, PrRef, RepoRef};
use super::{normalize_path, wire, PrError};

/// Page size requested from the iteration changes endpoint.
const CHANGES_PAGE: u32 = 2000;

/// First line of content returned for files that are not valid UTF-8.
pub const BINARY_MARKER: &str = "[Binary file - base64 encoded]";

impl AdoClient {
    /// Fetch PR metadata plus the commit ids of the latest iteration.
    #[instrument(skip(self), fields(pr = %pr))]
    pub async fn get_pr_info(&self, pr: &PrRef) -> Result<PrInfo, PrError> {
        const OP: &str = "get_pr_info";
        let id = pr.pr_id.to_string();
        let url = self.api_url(
            &pr.organization,
            &git_path(&pr.project, &pr.repository, &["pullRequests", &id]),
            &[],
        )?;
        let details: wire::PullRequest = self
            .get_json(OP, &format!("pull request {}", pr), url)
            .await?;
        debug!(title = %details.title, status = %details.status, "received PR metadata");

        let iteration = self.latest_iteration(OP, pr).await?;
        let commit_id = |commit: &Option<wire::CommitRef>| {
            commit
                .as_ref()
                .map(|c| c.commit_id.clone())
                .unwrap_or_default()
        };
        let source_commit_id = commit_id(&iteration.source_ref_commit);
        if source_commit_id.is_empty() {
            return Err(PrError::remote(
                OP,
                format!("iteration {} has no source commit", iteration.id),
            ));
        }

        Ok(PrInfo {
            id: details.pull_request_id,
            title: details.title,
            description: details.description.unwrap_or_default(),
            author: details.created_by.display_name,
            status: details.status,
            created_date: details.creation_date,
            source_branch: branch_name(&details.source_ref_name),
            target_branch: branch_name(&details.target_ref_name),
            organization: pr.organization.clone(),
            project: pr.project.clone(),
            repository: pr.repository.clone(),
            latest_iteration_id: iteration.id,
            target_commit_id: commit_id(&iteration.target_ref_commit),
            source_commit_id,
        })
    }

    /// List the files changed in the PR's latest iteration, in API order.
    /// A PR without changes yields an empty list.
    #[instrument(skip(self), fields(pr = %pr))]
    pub async fn list_changed_files(&self, pr: &PrRef) -> Result<Vec<FileChange>, PrError> {
        let (_, entries) = self.latest_changes("get_pr_files", pr).await?;
        let files: Vec<FileChange> = entries.iter().filter_map(file_change).collect();
        debug!(files = files.len(), "listed changed files");
        Ok(files)
    }

    /// Read a file at an explicit commit: commit → tree → blob.
    /// The same path and commit always return the same content.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        commit_id: &str,
    ) -> Result<String, PrError> {
        const OP: &str = "get_file_content";
        let path = normalize_path(path);
        let commit_id = commit_id.trim();
        if path.is_empty() {
            return Err(PrError::validation(OP, "file_path must not be empty"));
        }
        if commit_id.is_empty() {
            return Err(PrError::validation(
                OP,
                "commit_id is required; use source_commit_id from get_pr_info",
            ));
        }

        let url = self.api_url(&repo.organization, &repo_path(repo, &["commits", commit_id]), &[])?;
        let commit: wire::Commit = self
            .get_json(OP, &format!("commit {} in {}", commit_id, repo), url)
            .await?;
        let tree_id = commit
            .tree_id
            .ok_or_else(|| PrError::remote(OP, format!("commit {} has no tree id", commit_id)))?;

        let url = self.api_url(
            &repo.organization,
            &repo_path(repo, &["trees", &tree_id]),
            &[("recursive", "true")],
        )?;
        let tree: wire::Tree = self
            .get_json(OP, &format!("tree {} in {}", tree_id, repo), url)
            .await?;
        let not_found = || PrError::NotFound {
            operation: OP,
            what: format!("file {} at commit {}", path, commit_id),
        };
        let blob_id = tree
            .tree_entries
            .iter()
            .find(|entry| entry.relative_path == path && entry.git_object_type == "blob")
            .map(|entry| entry.object_id.clone())
            .ok_or_else(not_found)?;
        debug!(blob = %blob_id, "resolved blob");

        let url = self.api_url(&repo.organization, &repo_path(repo, &["blobs", &blob_id]), &[])?;
        let response = self
            .get_raw(OP, &format!("blob {} in {}", blob_id, repo), url)
            .await?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PrError::remote(OP, e.to_string()))?;

        let raw = if is_json {
            let blob: wire::JsonBlob = serde_json::from_slice(&bytes)
                .map_err(|e| PrError::remote(OP, format!("failed to parse blob response: {}", e)))?;
            let encoded = blob
                .content
                .ok_or_else(|| PrError::remote(OP, "no content found in blob response"))?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| PrError::remote(OP, format!("failed to decode file content: {}", e)))?
        } else {
            bytes.to_vec()
        };

        Ok(decode_content(raw))
    }

    /// Latest iteration of a PR. A PR always has at least one; an empty
    /// list means the API answered something unexpected.
    pub(crate) async fn latest_iteration(
        &self,
        operation: &'static str,
        pr: &PrRef,
    ) -> Result<wire::Iteration, PrError> {
        let id = pr.pr_id.to_string();
        let url = self.api_url(
            &pr.organization,
            &git_path(&pr.project, &pr.repository, &["pullRequests", &id, "iterations"]),
            &[],
        )?;
        let iterations: wire::ValueList<wire::Iteration> = self
            .get_json(operation, &format!("pull request {}", pr), url)
            .await?;
        iterations
            .value
            .into_iter()
            .max_by_key(|iteration| iteration.id)
            .ok_or_else(|| PrError::remote(operation, format!("no iterations found in {}", pr)))
    }

    /// Change entries of the latest iteration, following the API's
    /// nextSkip/nextTop continuation until it is exhausted.
    pub(crate) async fn latest_changes(
        &self,
        operation: &'static str,
        pr: &PrRef,
    ) -> Result<(u64, Vec<wire::ChangeEntry>), PrError> {
        let iteration = self.latest_iteration(operation, pr).await?.id;
        let id = pr.pr_id.to_string();
        let iteration_id = iteration.to_string();
        let what = format!("iteration {} of {}", iteration, pr);

        let mut entries = Vec::new();
        let mut skip = 0u32;
        let mut top = CHANGES_PAGE;
        loop {
            let (skip_param, top_param) = (skip.to_string(), top.to_string());
            let url = self.api_url(
                &pr.organization,
                &git_path(
                    &pr.project,
                    &pr.repository,
                    &["pullRequests", &id, "iterations", &iteration_id, "changes"],
                ),
                &[("$skip", &skip_param), ("$top", &top_param)],
            )?;
            let page: wire::IterationChanges = self.get_json(operation, &what, url).await?;
            entries.extend(page.change_entries);

            if page.next_top == 0 || page.next_skip <= skip {
                break;
            }
            skip = page.next_skip;
            top = page.next_top;
        }

        debug!(iteration, entries = entries.len(), "fetched iteration changes");
        Ok((iteration, entries))
    }
}

/// Convert a change entry into a descriptor. Folders, and entries with
/// no usable path, are dropped.
pub(crate) fn file_change(entry: &wire::ChangeEntry) -> Option<FileChange> {
    if entry.item.is_folder {
        return None;
    }
    let change_type = ChangeType::from_api(&entry.change_type);
    let original_path = entry
        .original_path
        .as_deref()
        .map(|p| normalize_path(p).to_string());
    let path = match change_type {
        // Deleted items may carry only the original path.
        ChangeType::Delete => entry
            .item
            .path
            .as_deref()
            .map(|p| normalize_path(p).to_string())
            .or_else(|| original_path.clone())?,
        _ => normalize_path(entry.item.path.as_deref()?).to_string(),
    };
    if path.is_empty() {
        return None;
    }
    Some(FileChange {
        path,
        change_type,
        original_path,
    })
}

/// `{project}/_apis/git/repositories/{repository}/{tail...}`
pub(crate) fn git_path<'a>(
    project: &'a str,
    repository: &'a str,
    tail: &[&'a str],
) -> Vec<&'a str> {
    let mut segments = vec![project, "_apis", "git", "repositories", repository];
    segments.extend_from_slice(tail);
    segments
}

fn repo_path<'a>(repo: &'a RepoRef, tail: &[&'a str]) -> Vec<&'a str> {
    git_path(&repo.project, &repo.repository, tail)
}

fn branch_name(ref_name: &str) -> String {
    ref_name
        .strip_prefix("refs/heads/")
        .unwrap_or(ref_name)
        .to_string()
}

fn decode_content(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(text) => text,
        Err(err) => format!(
            "{}\n{}",
            BINARY_MARKER,
            base64::engine::general_purpose::STANDARD.encode(err.into_bytes())
        ),
    }
}
