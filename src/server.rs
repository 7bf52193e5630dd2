use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pr::comment::comment_target;
use crate::pr::reference::{self, PrLocator};
use crate::pr::{AdoClient, NewPullRequest, PrError};

const INSTRUCTIONS: &str = "Tools for reviewing Azure DevOps pull requests with the user's Azure CLI login.

Typical review flow:
1. check_az_login to confirm the session.
2. get_pr_info with the PR URL. Note source_commit_id.
3. get_pr_files to list the changed files of the latest iteration.
4. get_file_content for each file, passing source_commit_id as commit_id.
5. post_pr_comment for findings. Pass file_path (and line_number) to anchor a comment; omit both for a general comment.

Every post_pr_comment call creates a new visible thread. Do not repeat a call that already succeeded.";

// --- Request types ---

/// A numeric id given either as a JSON number or a string.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
enum IdArg {
    Number(u64),
    Text(String),
}

impl IdArg {
    fn into_string(self) -> String {
        match self {
            IdArg::Number(n) => n.to_string(),
            IdArg::Text(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct LoginArgs {
    /// Optional: organization name or URL to verify the credential against (default: the configured one)
    organization: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct PrArgs {
    /// Full PR URL, e.g. https://dev.azure.com/org/project/_git/repo/pullrequest/123. Either this or organization/project/repository/pr_id.
    pr_url: Option<String>,
    /// Azure DevOps organization name or URL (e.g. "myorg" or "https://dev.azure.com/myorg")
    organization: Option<String>,
    /// Project name
    project: Option<String>,
    /// Repository name
    repository: Option<String>,
    /// Pull request id
    pr_id: Option<IdArg>,
}

impl PrArgs {
    fn locator(self) -> PrLocator {
        PrLocator {
            pr_url: self.pr_url,
            organization: self.organization,
            project: self.project,
            repository: self.repository,
            pr_id: self.pr_id.map(IdArg::into_string),
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct FileContentArgs {
    /// Path of the file in the repository, as listed by get_pr_files
    file_path: String,
    /// Commit to read the file at. Required; use source_commit_id from get_pr_info to read the PR's version.
    commit_id: String,
    /// Full PR URL identifying the repository. Either this or organization/project/repository.
    pr_url: Option<String>,
    /// Azure DevOps organization name or URL
    organization: Option<String>,
    /// Project name
    project: Option<String>,
    /// Repository name
    repository: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PostCommentArgs {
    #[serde(flatten)]
    pr: PrArgs,
    /// Comment text (markdown)
    comment: String,
    /// Optional: file to anchor the comment to, as listed by get_pr_files
    file_path: Option<String>,
    /// Optional: 1-based line in the PR's version of the file (requires file_path)
    line_number: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CreatePrArgs {
    /// Azure DevOps organization name or URL
    organization: String,
    /// Project name
    project: String,
    /// Repository name
    repository: String,
    /// Source branch name
    source_branch: String,
    /// Target branch name (default: main)
    target_branch: Option<String>,
    /// PR title
    title: String,
    /// PR description
    description: Option<String>,
    /// Reviewer emails or user names
    reviewers: Option<Vec<String>>,
    /// Work item ids to link
    work_items: Option<Vec<IdArg>>,
    /// Enable auto-complete when policies pass (default: false)
    auto_complete: Option<bool>,
    /// Create as draft PR (default: false)
    draft: Option<bool>,
}

// --- Server ---

#[derive(Clone)]
pub struct AdoPrServer {
    client: AdoClient,
    default_target_branch: String,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AdoPrServer {
    pub fn new(client: AdoClient, default_target_branch: String) -> Self {
        Self {
            client,
            default_target_branch,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Check that the Azure CLI session (or configured personal access token) is valid and report who is logged in. Pass organization to verify access to it"
    )]
    async fn check_az_login(
        &self,
        Parameters(args): Parameters<LoginArgs>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.check_login(args.organization.as_deref()).await {
            Ok(identity) => success(&identity),
            Err(e) => failure("check_az_login", e),
        }
    }

    #[tool(
        description = "Get pull request metadata: title, description, author, status, source/target branch, and the latest iteration's source_commit_id and target_commit_id for subsequent get_file_content calls"
    )]
    async fn get_pr_info(
        &self,
        Parameters(args): Parameters<PrArgs>,
    ) -> Result<CallToolResult, McpError> {
        let pr = match reference::resolve(&args.locator()) {
            Ok(pr) => pr,
            Err(e) => return failure("get_pr_info", e),
        };
        match self.client.get_pr_info(&pr).await {
            Ok(info) => success(&info),
            Err(e) => failure("get_pr_info", e),
        }
    }

    #[tool(
        description = "List the files changed in the latest iteration of a pull request. Returns [{path, changeType, originalPath?}] where changeType is add, edit, delete or rename"
    )]
    async fn get_pr_files(
        &self,
        Parameters(args): Parameters<PrArgs>,
    ) -> Result<CallToolResult, McpError> {
        let pr = match reference::resolve(&args.locator()) {
            Ok(pr) => pr,
            Err(e) => return failure("get_pr_files", e),
        };
        match self.client.list_changed_files(&pr).await {
            Ok(files) => success(&files),
            Err(e) => failure("get_pr_files", e),
        }
    }

    #[tool(
        description = "Get the raw content of a file at a specific commit. commit_id is required; pass source_commit_id from get_pr_info to read the PR's version"
    )]
    async fn get_file_content(
        &self,
        Parameters(args): Parameters<FileContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        let locator = PrLocator {
            pr_url: args.pr_url,
            organization: args.organization,
            project: args.project,
            repository: args.repository,
            pr_id: None,
        };
        let repo = match reference::resolve_repo(&locator) {
            Ok(repo) => repo,
            Err(e) => return failure("get_file_content", e),
        };
        match self
            .client
            .get_file_content(&repo, &args.file_path, &args.commit_id)
            .await
        {
            Ok(content) => Ok(CallToolResult::success(vec![Content::text(content)])),
            Err(e) => failure("get_file_content", e),
        }
    }

    #[tool(
        description = "Post a comment thread on a pull request. With file_path the comment is anchored to that file; with file_path and line_number to that line of the latest iteration; otherwise it is a general PR comment. Not idempotent: each call creates a new thread"
    )]
    async fn post_pr_comment(
        &self,
        Parameters(args): Parameters<PostCommentArgs>,
    ) -> Result<CallToolResult, McpError> {
        // Argument errors are reported before the reference is resolved
        // or anything is sent.
        let anchor =
            match comment_target(&args.comment, args.file_path.as_deref(), args.line_number) {
                Ok(anchor) => anchor,
                Err(e) => return failure("post_pr_comment", e),
            };
        let pr = match reference::resolve(&args.pr.locator()) {
            Ok(pr) => pr,
            Err(e) => return failure("post_pr_comment", e),
        };
        match self.client.post_comment(&pr, &args.comment, &anchor).await {
            Ok(posted) => success(&posted),
            Err(e) => failure("post_pr_comment", e),
        }
    }

    #[tool(
        description = "Create a new pull request after checking both branches exist. Optionally adds reviewers, links work items, enables auto-complete, or creates it as a draft"
    )]
    async fn create_pr(
        &self,
        Parameters(args): Parameters<CreatePrArgs>,
    ) -> Result<CallToolResult, McpError> {
        let locator = PrLocator {
            pr_url: None,
            organization: Some(args.organization),
            project: Some(args.project),
            repository: Some(args.repository),
            pr_id: None,
        };
        let repo = match reference::resolve_repo(&locator) {
            Ok(repo) => repo,
            Err(e) => return failure("create_pr", e),
        };
        let request = NewPullRequest {
            source_branch: args.source_branch,
            target_branch: args
                .target_branch
                .filter(|branch| !branch.trim().is_empty())
                .unwrap_or_else(|| self.default_target_branch.clone()),
            title: args.title,
            description: args.description,
            reviewers: args.reviewers.unwrap_or_default(),
            work_items: args
                .work_items
                .unwrap_or_default()
                .into_iter()
                .map(IdArg::into_string)
                .collect(),
            auto_complete: args.auto_complete.unwrap_or(false),
            draft: args.draft.unwrap_or(false),
        };
        match self.client.create_pull_request(&repo, &request).await {
            Ok(created) => success(&created),
            Err(e) => failure("create_pr", e),
        }
    }
}

#[tool_handler]
impl ServerHandler for AdoPrServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn success<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Tool-level failure: reported to the assistant, never fatal to the server.
fn failure(tool: &str, err: PrError) -> Result<CallToolResult, McpError> {
    warn!(tool, kind = err.kind(), error = %err, "tool call failed");
    Ok(CallToolResult::error(vec![Content::text(format!(
        "{} failed [{}]: {}",
        tool,
        err.kind(),
        err
    ))]))
}

/// Log the tool surface once at startup.
pub fn log_tools(server: &AdoPrServer) {
    let names: Vec<String> = server
        .tool_router
        .list_all()
        .into_iter()
        .map(|tool| tool.name.to_string())
        .collect();
    info!(tools = ?names, "registered MCP tools");
}
