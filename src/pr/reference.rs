use super::types::{PrRef, RepoRef};
use super::PrError;

/// A PR as the caller identified it: a web URL, structured fields, or both.
/// Nothing is resolved until `resolve()` or `resolve_repo()` is called.
#[derive(Debug, Clone, Default)]
pub struct PrLocator {
    pub pr_url: Option<String>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub pr_id: Option<String>,
}

impl PrLocator {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            pr_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Human-readable form used in error messages.
    fn describe(&self) -> String {
        if let Some(url) = non_empty(&self.pr_url) {
            return url.to_string();
        }
        let part = |v: &Option<String>| non_empty(v).unwrap_or("?").to_string();
        format!(
            "{}/{}/{}!{}",
            part(&self.organization),
            part(&self.project),
            part(&self.repository),
            part(&self.pr_id)
        )
    }
}

/// Parse an Azure DevOps PR web URL into its component parts.
///
/// Accepted formats:
///   https://dev.azure.com/{org}/{project}/_git/{repo}/pullrequest/{id}
///   https://{org}.visualstudio.com/{project}/_git/{repo}/pullrequest/{id}
///
/// Any other host is treated like dev.azure.com (organization as the first
/// path segment). Percent-encoded segments are decoded.
pub fn parse_pr_url(url: &str) -> Result<PrRef, PrError> {
    let invalid = |reason: &str| PrError::InvalidReference {
        reference: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid("not a URL"))?;
    if parsed.scheme() != "https" {
        return Err(invalid("expected an https URL"));
    }
    let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;

    let mut segments = Vec::new();
    for segment in parsed
        .path_segments()
        .ok_or_else(|| invalid("missing path"))?
        .filter(|segment| !segment.is_empty())
    {
        let decoded = urlencoding::decode(segment)
            .map_err(|_| invalid("path segment is not valid UTF-8"))?;
        segments.push(decoded.into_owned());
    }

    let organization = match host.strip_suffix(".visualstudio.com") {
        Some(org) if !org.is_empty() => org.to_string(),
        _ => {
            if segments.is_empty() {
                return Err(invalid("missing organization"));
            }
            segments.remove(0)
        }
    };

    match segments.as_slice() {
        [project, git, repository, pull, id]
            if git == "_git" && pull.eq_ignore_ascii_case("pullrequest") =>
        {
            let pr_id = parse_pr_id(id).ok_or_else(|| invalid("PR id must be a positive number"))?;
            Ok(PrRef {
                organization,
                project: project.clone(),
                repository: repository.clone(),
                pr_id,
            })
        }
        _ => Err(invalid(
            "expected https://dev.azure.com/<org>/<project>/_git/<repo>/pullrequest/<id>",
        )),
    }
}

/// Reduce an organization given as a name or URL to the bare name.
///
/// "myorg", "https://dev.azure.com/myorg" and "https://myorg.visualstudio.com"
/// all yield "myorg".
pub fn clean_organization(organization: &str) -> String {
    let trimmed = organization.trim().trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return trimmed.to_string();
    }
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.strip_suffix(".visualstudio.com")
        .unwrap_or(last)
        .to_string()
}

/// Resolve a locator to exactly one pull request.
///
/// A URL wins over structured fields; structured fields given alongside it
/// must agree with it. Without a URL, all four fields are required.
pub fn resolve(locator: &PrLocator) -> Result<PrRef, PrError> {
    let invalid = |reason: String| PrError::InvalidReference {
        reference: locator.describe(),
        reason,
    };

    if let Some(url) = non_empty(&locator.pr_url) {
        let pr = parse_pr_url(url)?;
        check_agrees(locator, &pr.repo()).map_err(invalid)?;
        if let Some(id) = non_empty(&locator.pr_id) {
            if parse_pr_id(id) != Some(pr.pr_id) {
                return Err(invalid(format!(
                    "pr_id {} conflicts with id {} in pr_url",
                    id, pr.pr_id
                )));
            }
        }
        return Ok(pr);
    }

    let repo = structured_repo(locator, true).map_err(invalid)?;
    let id = non_empty(&locator.pr_id).ok_or_else(|| invalid("missing pr_id".to_string()))?;
    let pr_id = parse_pr_id(id)
        .ok_or_else(|| invalid(format!("pr_id '{}' must be a positive number", id)))?;

    Ok(PrRef {
        organization: repo.organization,
        project: repo.project,
        repository: repo.repository,
        pr_id,
    })
}

/// Resolve a locator to a repository. The PR id is optional here.
pub fn resolve_repo(locator: &PrLocator) -> Result<RepoRef, PrError> {
    let invalid = |reason: String| PrError::InvalidReference {
        reference: locator.describe(),
        reason,
    };

    if let Some(url) = non_empty(&locator.pr_url) {
        let repo = parse_pr_url(url)?.repo();
        check_agrees(locator, &repo).map_err(invalid)?;
        return Ok(repo);
    }

    structured_repo(locator, false).map_err(invalid)
}

fn structured_repo(locator: &PrLocator, with_id: bool) -> Result<RepoRef, String> {
    let mut missing = Vec::new();
    let organization = non_empty(&locator.organization).map(clean_organization);
    if organization.as_deref().map_or(true, str::is_empty) {
        missing.push("organization");
    }
    let project = non_empty(&locator.project);
    if project.is_none() {
        missing.push("project");
    }
    let repository = non_empty(&locator.repository);
    if repository.is_none() {
        missing.push("repository");
    }
    if with_id && non_empty(&locator.pr_id).is_none() {
        missing.push("pr_id");
    }
    if !missing.is_empty() {
        return Err(format!(
            "missing {} (or pass pr_url instead)",
            missing.join(", ")
        ));
    }

    Ok(RepoRef {
        organization: organization.unwrap_or_default(),
        project: project.unwrap_or_default().to_string(),
        repository: repository.unwrap_or_default().to_string(),
    })
}

/// Structured fields supplied next to a URL must name the same repository.
fn check_agrees(locator: &PrLocator, repo: &RepoRef) -> Result<(), String> {
    let pairs = [
        (
            "organization",
            non_empty(&locator.organization).map(clean_organization),
            &repo.organization,
        ),
        (
            "project",
            non_empty(&locator.project).map(str::to_string),
            &repo.project,
        ),
        (
            "repository",
            non_empty(&locator.repository).map(str::to_string),
            &repo.repository,
        ),
    ];
    for (field, given, from_url) in pairs {
        if let Some(given) = given {
            // Azure DevOps names are case-insensitive.
            if !given.eq_ignore_ascii_case(from_url) {
                return Err(format!(
                    "{} '{}' conflicts with '{}' in pr_url",
                    field, given, from_url
                ));
            }
        }
    }
    Ok(())
}

fn parse_pr_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
