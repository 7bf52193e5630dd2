//! Azure DevOps REST payloads (api-version 7.1), trimmed to the fields used.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ValueList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

// git/repositories/{repo}/pullRequests/{id}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub pull_request_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: IdentityRef,
    #[serde(default)]
    pub creation_date: String,
    pub status: String,
    pub source_ref_name: String,
    pub target_ref_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub display_name: String,
}

// pullRequests/{id}/iterations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: u64,
    #[serde(default)]
    pub source_ref_commit: Option<CommitRef>,
    #[serde(default)]
    pub target_ref_commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    #[serde(default)]
    pub commit_id: String,
}

// pullRequests/{id}/iterations/{iteration}/changes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationChanges {
    #[serde(default)]
    pub change_entries: Vec<ChangeEntry>,
    #[serde(default)]
    pub next_skip: u32,
    #[serde(default)]
    pub next_top: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    #[serde(default)]
    pub change_tracking_id: Option<u64>,
    #[serde(default)]
    pub change_type: String,
    #[serde(default)]
    pub item: ChangeItem,
    #[serde(default)]
    pub original_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
}

// commits/{id}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    #[serde(default)]
    pub tree_id: Option<String>,
}

// trees/{id}?recursive=true
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    #[serde(default)]
    pub tree_entries: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub relative_path: String,
    pub git_object_type: String,
    pub object_id: String,
}

// blobs/{id} when served as JSON
#[derive(Debug, Deserialize)]
pub struct JsonBlob {
    #[serde(default)]
    pub content: Option<String>,
}

// pullRequests/{id}/threads (POST)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    pub comments: Vec<NewComment>,
    /// 1 = active
    pub status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_context: Option<ThreadContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_thread_context: Option<PullRequestThreadContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub parent_comment_id: u64,
    pub content: String,
    /// 1 = text
    pub comment_type: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_file_start: Option<FilePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_file_end: Option<FilePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_file_start: Option<FilePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_file_end: Option<FilePosition>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FilePosition {
    pub line: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestThreadContext {
    pub iteration_context: IterationContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_tracking_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationContext {
    pub first_comparing_iteration: u64,
    pub second_comparing_iteration: u64,
}

#[derive(Debug, Deserialize)]
pub struct Thread {
    pub id: u64,
    #[serde(default)]
    pub comments: Vec<ThreadComment>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadComment {
    pub id: u64,
}

// refs?filter=heads/{branch}
#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub name: String,
}

// {org}/_apis/connectionData
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    #[serde(default)]
    pub authenticated_user: Option<ConnectionUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUser {
    #[serde(default)]
    pub provider_display_name: Option<String>,
}

// _apis/identities?searchFilter=General
#[derive(Debug, Deserialize)]
pub struct IdentityMatch {
    pub id: String,
}

// pullrequests (POST)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPullRequestBody {
    pub source_ref_name: String,
    pub target_ref_name: String,
    pub title: String,
    pub description: String,
    pub is_draft: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reviewers: Vec<ReviewerRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub work_item_refs: Vec<WorkItemRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_options: Option<CompletionOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewerRef {
    Id(String),
    DisplayName(String),
}

#[derive(Debug, Serialize)]
pub struct WorkItemRef {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub delete_source_branch: bool,
    pub merge_commit_message: String,
    pub squash_merge: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPullRequest {
    pub pull_request_id: u64,
    pub title: String,
    #[serde(default)]
    pub is_draft: bool,
}
