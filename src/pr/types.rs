use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Fully resolved coordinates of one pull request.
/// Built by `reference::parse_pr_url()` or `reference::resolve()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrRef {
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub pr_id: u64,
}

impl PrRef {
    /// Repository part of the reference, for calls that are not PR-scoped.
    pub fn repo(&self) -> RepoRef {
        RepoRef {
            organization: self.organization.clone(),
            project: self.project.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}!{}",
            self.organization, self.project, self.repository, self.pr_id
        )
    }
}

/// Organization/project/repository triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub organization: String,
    pub project: String,
    pub repository: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.repository)
    }
}

/// Pull request metadata plus the commit ids of its latest iteration,
/// which callers feed into `get_file_content`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub status: String,
    pub created_date: String,
    /// Branch name without the `refs/heads/` prefix
    pub source_branch: String,
    pub target_branch: String,
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub latest_iteration_id: u64,
    /// Source (PR head) commit of the latest iteration; read file content at this one
    pub source_commit_id: String,
    /// Target (base) commit of the latest iteration
    pub target_commit_id: String,
}

/// Kind of change recorded for a file in an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Edit,
    Delete,
    Rename,
    /// Any other value the API reports, kept verbatim
    Other(String),
}

impl ChangeType {
    /// Map the API's `changeType` flags (e.g. "edit", "edit, rename")
    /// to a single kind. Delete and add dominate rename; rename dominates edit.
    pub fn from_api(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return ChangeType::Edit;
        }
        let has = |flag: &str| lowered.split(',').any(|part| part.trim() == flag);
        if has("delete") {
            ChangeType::Delete
        } else if has("add") {
            ChangeType::Add
        } else if has("rename") {
            ChangeType::Rename
        } else if has("edit") {
            ChangeType::Edit
        } else {
            ChangeType::Other(lowered)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Edit => "edit",
            ChangeType::Delete => "delete",
            ChangeType::Rename => "rename",
            ChangeType::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChangeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One file changed in the latest iteration of a PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Repository-relative path, without a leading `/`
    pub path: String,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

/// Where a comment thread is anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentAnchor {
    General,
    File { path: String },
    Line { path: String, line: u32 },
}

impl CommentAnchor {
    /// Build an anchor from the optional tool arguments. A line number
    /// without a file path is rejected by the caller before this point.
    pub fn new(file_path: Option<String>, line: Option<u32>) -> Option<Self> {
        match (file_path, line) {
            (None, None) => Some(CommentAnchor::General),
            (Some(path), None) => Some(CommentAnchor::File { path }),
            (Some(path), Some(line)) => Some(CommentAnchor::Line { path, line }),
            (None, Some(_)) => None,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            CommentAnchor::General => None,
            CommentAnchor::File { path } | CommentAnchor::Line { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for CommentAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentAnchor::General => write!(f, "general"),
            CommentAnchor::File { path } => write!(f, "{}", path),
            CommentAnchor::Line { path, line } => write!(f, "{}:{}", path, line),
        }
    }
}

/// Result of posting a comment thread.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedComment {
    pub thread_id: u64,
    pub comment_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

/// Parameters for creating a pull request.
#[derive(Debug, Clone, Default)]
pub struct NewPullRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
    pub reviewers: Vec<String>,
    pub work_items: Vec<String>,
    pub auto_complete: bool,
    pub draft: bool,
}

/// Result of creating a pull request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPr {
    pub id: u64,
    pub title: String,
    pub url: String,
    pub source_branch: String,
    pub target_branch: String,
    pub is_draft: bool,
}

/// Who the current session authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub name: String,
    /// "user", "servicePrincipal", or "pat"
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}
