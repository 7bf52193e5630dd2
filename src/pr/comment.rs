use tracing::{debug, info, instrument};

use super::client::AdoClient;
use super::fetch::git_path;
use super::types::{ChangeType, CommentAnchor, PostedComment, PrRef};
use super::{normalize_path, wire, PrError};

const OP: &str = "post_pr_comment";

/// Validate raw comment arguments and build the anchor.
///
/// Runs before any network call: a line number needs a file path, lines
/// are 1-based, and the comment text must not be blank.
pub fn comment_target(
    comment: &str,
    file_path: Option<&str>,
    line_number: Option<i64>,
) -> Result<CommentAnchor, PrError> {
    if comment.trim().is_empty() {
        return Err(PrError::validation(OP, "comment must not be empty"));
    }

    let file_path = file_path
        .map(normalize_path)
        .filter(|path| !path.is_empty())
        .map(str::to_string);
    let line = match line_number {
        None => None,
        Some(line) if line >= 1 && line <= i64::from(u32::MAX) => Some(line as u32),
        Some(line) => {
            return Err(PrError::validation(
                OP,
                format!("line_number must be a positive line number, got {}", line),
            ))
        }
    };

    CommentAnchor::new(file_path, line)
        .ok_or_else(|| PrError::validation(OP, "line_number requires file_path to be specified"))
}

impl AdoClient {
    /// Create a comment thread on the PR. Each call creates a new thread.
    ///
    /// File-anchored threads are pinned to the latest iteration; the file
    /// must be among that iteration's changes.
    #[instrument(skip(self, comment), fields(pr = %pr, anchor = %anchor))]
    pub async fn post_comment(
        &self,
        pr: &PrRef,
        comment: &str,
        anchor: &CommentAnchor,
    ) -> Result<PostedComment, PrError> {
        if comment.trim().is_empty() {
            return Err(PrError::validation(OP, "comment must not be empty"));
        }

        let mut thread = wire::NewThread {
            comments: vec![wire::NewComment {
                parent_comment_id: 0,
                content: comment.to_string(),
                comment_type: 1,
            }],
            status: 1,
            thread_context: None,
            pull_request_thread_context: None,
        };

        let mut anchored_path = None;
        if let Some(path) = anchor.file_path() {
            let path = normalize_path(path);
            let (iteration, entries) = self.latest_changes(OP, pr).await?;
            let entry = find_change(&entries, path).ok_or_else(|| PrError::NotFound {
                operation: OP,
                what: format!(
                    "file '{}' in the latest iteration of {}; use a path from get_pr_files",
                    path, pr
                ),
            })?;
            debug!(
                iteration,
                change_tracking_id = ?entry.change_tracking_id,
                "anchoring to change"
            );

            let line = match anchor {
                CommentAnchor::Line { line, .. } => Some(wire::FilePosition {
                    line: *line,
                    offset: 1,
                }),
                _ => None,
            };
            // Deleted files only exist on the left side of the diff; anything
            // else is anchored at its current path, even if matched by its old one.
            let deleted = ChangeType::from_api(&entry.change_type) == ChangeType::Delete;
            let (right, left) = if deleted { (None, line) } else { (line, None) };
            let target = match entry.item.path.as_deref().map(normalize_path) {
                Some(current) if !deleted && !current.is_empty() => current,
                _ => path,
            };

            thread.thread_context = Some(wire::ThreadContext {
                file_path: format!("/{}", target),
                right_file_start: right,
                right_file_end: right,
                left_file_start: left,
                left_file_end: left,
            });
            thread.pull_request_thread_context = Some(wire::PullRequestThreadContext {
                iteration_context: wire::IterationContext {
                    first_comparing_iteration: iteration,
                    second_comparing_iteration: iteration,
                },
                change_tracking_id: entry.change_tracking_id,
            });
            anchored_path = Some(target.to_string());
        }

        let id = pr.pr_id.to_string();
        let url = self.api_url(
            &pr.organization,
            &git_path(&pr.project, &pr.repository, &["pullRequests", &id, "threads"]),
            &[],
        )?;
        let created: wire::Thread = self
            .post_json(OP, &format!("pull request {}", pr), url, &thread)
            .await?;
        let comment_id = created.comments.first().map(|c| c.id).ok_or_else(|| {
            PrError::remote(
                OP,
                format!("thread {} was created but the response lists no comment", created.id),
            )
        })?;
        info!(thread = created.id, comment = comment_id, "posted comment");

        let line_number = match anchor {
            CommentAnchor::Line { line, .. } => Some(*line),
            _ => None,
        };
        Ok(PostedComment {
            thread_id: created.id,
            comment_id,
            file_path: anchored_path,
            line_number,
        })
    }
}

/// Match a path against current and original paths of the changes.
fn find_change<'a>(entries: &'a [wire::ChangeEntry], path: &str) -> Option<&'a wire::ChangeEntry> {
    let matches = |candidate: Option<&str>| candidate.map(normalize_path) == Some(path);
    entries
        .iter()
        .filter(|entry| !entry.item.is_folder)
        .find(|entry| matches(entry.item.path.as_deref()))
        .or_else(|| {
            entries
                .iter()
                .find(|entry| matches(entry.original_path.as_deref()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::client::tests::{api_mock, test_client};
    use mockito::Matcher;
    use serde_json::json;

    const PR_PATH: &str = "/org/proj/_apis/git/repositories/repo/pullRequests/42";

    fn pr() -> PrRef {
        PrRef {
            organization: "org".to_string(),
            project: "proj".to_string(),
            repository: "repo".to_string(),
            pr_id: 42,
        }
    }

    async fn mock_changes(server: &mut mockito::ServerGuard) -> (mockito::Mock, mockito::Mock) {
        let iterations = api_mock(server, "GET", &format!("{PR_PATH}/iterations"))
            .with_status(200)
            .with_body(r#"{"value":[{"id":1},{"id":3}]}"#)
            .create_async()
            .await;
        let changes = api_mock(server, "GET", &format!("{PR_PATH}/iterations/3/changes"))
            .with_status(200)
            .with_body(
                r#"{"changeEntries":[
                    {"changeTrackingId":5,"changeType":"edit","item":{"path":"/src/main.go"}},
                    {"changeTrackingId":6,"changeType":"delete","originalPath":"/gone.go","item":{"path":"/gone.go"}}
                ]}"#,
            )
            .create_async()
            .await;
        (iterations, changes)
    }

    #[test]
    fn test_line_without_file_is_rejected() {
        let err = comment_target("nit", None, Some(10)).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("requires file_path"));
    }

    #[test]
    fn test_comment_target_validation() {
        assert!(matches!(
            comment_target("   ", None, None).unwrap_err(),
            PrError::Validation { .. }
        ));
        assert!(matches!(
            comment_target("nit", Some("a.rs"), Some(0)).unwrap_err(),
            PrError::Validation { .. }
        ));
        assert!(matches!(
            comment_target("nit", Some("a.rs"), Some(-4)).unwrap_err(),
            PrError::Validation { .. }
        ));
        assert_eq!(comment_target("ok", None, None).unwrap(), CommentAnchor::General);
        assert_eq!(
            comment_target("ok", Some("/src/a.rs"), None).unwrap(),
            CommentAnchor::File {
                path: "src/a.rs".to_string()
            }
        );
        // An empty path counts as absent.
        assert_eq!(comment_target("ok", Some(""), None).unwrap(), CommentAnchor::General);
    }

    #[tokio::test]
    async fn test_post_general_comment() {
        let mut server = mockito::Server::new_async().await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .match_body(Matcher::Json(json!({
                "comments": [{"parentCommentId": 0, "content": "Looks good", "commentType": 1}],
                "status": 1
            })))
            .with_status(200)
            .with_body(r#"{"id":77,"comments":[{"id":1,"content":"Looks good"}]}"#)
            .create_async()
            .await;

        let posted = test_client(&server.url())
            .post_comment(&pr(), "Looks good", &CommentAnchor::General)
            .await
            .unwrap();
        assert_eq!(posted.thread_id, 77);
        assert_eq!(posted.comment_id, 1);
        assert!(posted.file_path.is_none());
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_line_comment() {
        let mut server = mockito::Server::new_async().await;
        let _changes = mock_changes(&mut server).await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .match_body(Matcher::Json(json!({
                "comments": [{"parentCommentId": 0, "content": "nit: rename variable", "commentType": 1}],
                "status": 1,
                "threadContext": {
                    "filePath": "/src/main.go",
                    "rightFileStart": {"line": 10, "offset": 1},
                    "rightFileEnd": {"line": 10, "offset": 1}
                },
                "pullRequestThreadContext": {
                    "iterationContext": {"firstComparingIteration": 3, "secondComparingIteration": 3},
                    "changeTrackingId": 5
                }
            })))
            .with_status(200)
            .with_body(r#"{"id":78,"comments":[{"id":1}]}"#)
            .create_async()
            .await;

        let anchor = comment_target("nit: rename variable", Some("src/main.go"), Some(10)).unwrap();
        let posted = test_client(&server.url())
            .post_comment(&pr(), "nit: rename variable", &anchor)
            .await
            .unwrap();
        assert_eq!(posted.comment_id, 1);
        assert_eq!(posted.file_path.as_deref(), Some("src/main.go"));
        assert_eq!(posted.line_number, Some(10));
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_file_comment_without_line() {
        let mut server = mockito::Server::new_async().await;
        let _changes = mock_changes(&mut server).await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .match_body(Matcher::Json(json!({
                "comments": [{"parentCommentId": 0, "content": "split this file", "commentType": 1}],
                "status": 1,
                "threadContext": {"filePath": "/src/main.go"},
                "pullRequestThreadContext": {
                    "iterationContext": {"firstComparingIteration": 3, "secondComparingIteration": 3},
                    "changeTrackingId": 5
                }
            })))
            .with_status(200)
            .with_body(r#"{"id":80,"comments":[{"id":1}]}"#)
            .create_async()
            .await;

        let anchor = comment_target("split this file", Some("/src/main.go"), None).unwrap();
        let posted = test_client(&server.url())
            .post_comment(&pr(), "split this file", &anchor)
            .await
            .unwrap();
        assert_eq!(posted.file_path.as_deref(), Some("src/main.go"));
        assert!(posted.line_number.is_none());
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_comment_by_old_path_anchors_renamed_file() {
        let mut server = mockito::Server::new_async().await;
        let _iterations = api_mock(&mut server, "GET", &format!("{PR_PATH}/iterations"))
            .with_status(200)
            .with_body(r#"{"value":[{"id":2}]}"#)
            .create_async()
            .await;
        let _changes = api_mock(&mut server, "GET", &format!("{PR_PATH}/iterations/2/changes"))
            .with_status(200)
            .with_body(
                r#"{"changeEntries":[
                    {"changeTrackingId":7,"changeType":"rename","originalPath":"/old.rs","item":{"path":"/new.rs"}}
                ]}"#,
            )
            .create_async()
            .await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .match_body(Matcher::PartialJson(json!({
                "threadContext": {
                    "filePath": "/new.rs",
                    "rightFileStart": {"line": 3, "offset": 1}
                },
                "pullRequestThreadContext": {"changeTrackingId": 7}
            })))
            .with_status(200)
            .with_body(r#"{"id":81,"comments":[{"id":1}]}"#)
            .create_async()
            .await;

        let anchor = comment_target("typo", Some("old.rs"), Some(3)).unwrap();
        let posted = test_client(&server.url())
            .post_comment(&pr(), "typo", &anchor)
            .await
            .unwrap();
        assert_eq!(posted.file_path.as_deref(), Some("new.rs"));
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_comment_on_deleted_file_uses_left_side() {
        let mut server = mockito::Server::new_async().await;
        let _changes = mock_changes(&mut server).await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .match_body(Matcher::PartialJson(json!({
                "threadContext": {
                    "filePath": "/gone.go",
                    "leftFileStart": {"line": 2, "offset": 1},
                    "leftFileEnd": {"line": 2, "offset": 1}
                }
            })))
            .with_status(200)
            .with_body(r#"{"id":79,"comments":[{"id":1}]}"#)
            .create_async()
            .await;

        let anchor = comment_target("why remove this?", Some("gone.go"), Some(2)).unwrap();
        test_client(&server.url())
            .post_comment(&pr(), "why remove this?", &anchor)
            .await
            .unwrap();
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_comment_unknown_file() {
        let mut server = mockito::Server::new_async().await;
        let _changes = mock_changes(&mut server).await;
        let post = api_mock(&mut server, "POST", &format!("{PR_PATH}/threads"))
            .expect(0)
            .create_async()
            .await;

        let anchor = CommentAnchor::File {
            path: "src/other.go".to_string(),
        };
        let err = test_client(&server.url())
            .post_comment(&pr(), "hmm", &anchor)
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::NotFound { .. }));
        post.assert_async().await;
    }

    #[test]
    fn test_find_change_by_original_path() {
        let entries: Vec<wire::ChangeEntry> = serde_json::from_value(json!([
            {"changeType": "rename", "originalPath": "/old.rs", "item": {"path": "/new.rs"}}
        ]))
        .unwrap();
        assert!(find_change(&entries, "new.rs").is_some());
        assert!(find_change(&entries, "old.rs").is_some());
        assert!(find_change(&entries, "other.rs").is_none());
    }
}
