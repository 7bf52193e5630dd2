use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::reference::clean_organization;
use super::session::{self, Credential, Session, PAT_KIND};
use super::types::Identity;
use super::{wire, PrError};
use crate::config::{AzureConfig, Config};

const USER_AGENT: &str = concat!("ado-pr-mcp/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body carried into a RemoteError.
const MAX_ERROR_BODY: usize = 500;

/// Thin Azure DevOps REST client. Holds no per-PR state; every operation
/// is an independent sequence of round trips.
#[derive(Clone)]
pub struct AdoClient {
    http: reqwest::Client,
    api_base: Url,
    api_version: String,
    organization: Option<String>,
    session: Arc<dyn Session>,
}

impl AdoClient {
    pub fn new(config: &AzureConfig, session: Arc<dyn Session>) -> Result<Self, PrError> {
        let api_base = Url::parse(&config.api_base).map_err(|e| {
            PrError::validation(
                "configure client",
                format!("api_base '{}': {}", config.api_base, e),
            )
        })?;
        if api_base.cannot_be_a_base() {
            return Err(PrError::validation(
                "configure client",
                format!("api_base '{}' cannot be a base URL", config.api_base),
            ));
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| PrError::remote("configure client", e.to_string()))?;

        Ok(Self {
            http,
            api_base,
            api_version: config.api_version.clone(),
            organization: config
                .organization
                .as_deref()
                .map(clean_organization)
                .filter(|org| !org.is_empty()),
            session,
        })
    }

    /// Client using the session the config selects (PAT or Azure CLI).
    pub fn from_config(config: &Config) -> Result<Self, PrError> {
        Self::new(&config.azure, session::from_config(config))
    }

    /// Confirm the session is usable and report who it belongs to.
    ///
    /// With an organization (given or configured) the credential is tried
    /// against its connectionData endpoint. A PAT can only be checked that
    /// way; an az session without one is checked by fetching a token.
    #[instrument(skip(self))]
    pub async fn check_login(&self, organization: Option<&str>) -> Result<Identity, PrError> {
        const OP: &str = "check_az_login";
        let mut identity = self.session.identity().await?;
        let organization = organization
            .map(clean_organization)
            .filter(|org| !org.is_empty())
            .or_else(|| self.organization.clone());

        let Some(organization) = organization else {
            if identity.kind == PAT_KIND {
                return Err(PrError::validation(
                    OP,
                    "organization is required to verify a personal access token",
                ));
            }
            self.session.credential().await?;
            return Ok(identity);
        };

        let url = self.web_url(&organization, &["_apis", "connectionData"])?;
        let what = format!("organization {}", organization);
        let data: wire::ConnectionData = self.get_json(OP, &what, url).await?;
        let user = data.authenticated_user.ok_or_else(|| {
            PrError::Unauthenticated(format!("{} did not recognise the credential", organization))
        })?;
        if identity.kind == PAT_KIND {
            if let Some(name) = user.provider_display_name {
                identity.name = name;
            }
        }
        debug!(organization = %organization, name = %identity.name, "session verified");
        Ok(identity)
    }

    /// `{api_base}/{organization}/{path...}?api-version=..&{query...}`.
    /// Segments are percent-encoded as needed.
    pub(crate) fn api_url(
        &self,
        organization: &str,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, PrError> {
        let mut url = self.web_url(organization, path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-version", &self.api_version);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// `{api_base}/{organization}/{path...}` without query parameters.
    pub(crate) fn web_url(&self, organization: &str, path: &[&str]) -> Result<Url, PrError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| PrError::remote("build url", "api_base cannot be a base URL"))?
            .pop_if_empty()
            .push(organization)
            .extend(path);
        Ok(url)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        what: &str,
        url: Url,
    ) -> Result<T, PrError> {
        let response = self.send(operation, what, Method::GET, url, None::<&()>).await?;
        decode_json(operation, response).await
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        what: &str,
        url: Url,
        body: &B,
    ) -> Result<T, PrError> {
        let response = self.send(operation, what, Method::POST, url, Some(body)).await?;
        decode_json(operation, response).await
    }

    /// GET returning the raw response, for non-JSON bodies.
    pub(crate) async fn get_raw(
        &self,
        operation: &'static str,
        what: &str,
        url: Url,
    ) -> Result<Response, PrError> {
        self.send(operation, what, Method::GET, url, None::<&()>).await
    }

    /// Authenticate, send, and map non-success statuses onto PrError.
    /// `what` names the resource for NotFound messages.
    async fn send<B: Serialize>(
        &self,
        operation: &'static str,
        what: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response, PrError> {
        let credential = self.session.credential().await?;

        debug!(%method, path = url.path(), "azure devops request");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = authorize(request, &credential)
            .send()
            .await
            .map_err(|e| PrError::remote(operation, e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "azure devops response");
        match status {
            // Azure DevOps answers 203 with a sign-in page when the token is rejected.
            StatusCode::UNAUTHORIZED | StatusCode::NON_AUTHORITATIVE_INFORMATION => {
                Err(PrError::Unauthenticated(format!(
                    "{} was rejected with HTTP {}",
                    operation,
                    status.as_u16()
                )))
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Err(PrError::NotFound {
                operation,
                what: what.to_string(),
            }),
            status if status.is_success() => Ok(response),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PrError::Remote {
                    operation,
                    status: Some(status.as_u16()),
                    message: error_message(&body, status),
                })
            }
        }
    }
}

fn authorize(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
    match credential {
        Credential::Bearer(token) => request.bearer_auth(token),
        Credential::Pat(token) => request.basic_auth("", Some(token)),
    }
}

async fn decode_json<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, PrError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PrError::remote(operation, e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PrError::remote(operation, format!("failed to parse response: {}", e)))
}

/// Prefer the `message` field Azure DevOps puts in error bodies.
fn error_message(body: &str, status: StatusCode) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }

    if let Ok(error) = serde_json::from_str::<ApiError>(body) {
        return error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pr::session::PatSession;

    /// Client pointed at a mockito server, authenticating with a fixed PAT.
    pub fn test_client(base: &str) -> AdoClient {
        let config = AzureConfig {
            api_base: base.to_string(),
            timeout_secs: Some(5),
            ..AzureConfig::default()
        };
        AdoClient::new(&config, Arc::new(PatSession::new("test-pat"))).unwrap()
    }

    /// Mock on `path` accepting any query string (every call carries api-version).
    pub fn api_mock(server: &mut mockito::ServerGuard, method: &str, path: &str) -> mockito::Mock {
        server.mock(method, path).match_query(mockito::Matcher::Any)
    }

    #[test]
    fn test_api_url_encodes_segments() {
        let client = test_client("https://dev.azure.com");
        let url = client
            .api_url(
                "org",
                &["My Project", "_apis", "git", "repositories", "repo", "trees", "abc"],
                &[("recursive", "true")],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/org/My%20Project/_apis/git/repositories/repo/trees/abc?api-version=7.1&recursive=true"
        );
    }

    #[test]
    fn test_web_url_with_base_path() {
        let client = test_client("https://ado.example.com/tfs/");
        let url = client.web_url("Collection", &["proj", "_git", "repo"]).unwrap();
        assert_eq!(url.as_str(), "https://ado.example.com/tfs/Collection/proj/_git/repo");
    }

    #[test]
    fn test_invalid_api_base() {
        let config = AzureConfig {
            api_base: "not a url".to_string(),
            ..AzureConfig::default()
        };
        let err = AdoClient::new(&config, Arc::new(PatSession::new("x"))).err().unwrap();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_error_message_prefers_api_message() {
        let body = r#"{"$id":"1","message":"TF401019: The Git repository does not exist.","typeKey":"GitRepositoryNotFoundException"}"#;
        assert_eq!(
            error_message(body, StatusCode::BAD_REQUEST),
            "TF401019: The Git repository does not exist."
        );
        assert_eq!(
            error_message("", StatusCode::INTERNAL_SERVER_ERROR),
            "Internal Server Error"
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let _unauthorized = api_mock(&mut server, "GET", "/org/_apis/a")
            .with_status(401)
            .create_async()
            .await;
        let _forbidden = api_mock(&mut server, "GET", "/org/_apis/b")
            .with_status(403)
            .create_async()
            .await;
        let _broken = api_mock(&mut server, "GET", "/org/_apis/c")
            .with_status(500)
            .with_body(r#"{"message":"database unavailable"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let get = |path: &'static str| {
            let client = client.clone();
            async move {
                let url = client.api_url("org", &["_apis", path], &[]).unwrap();
                client
                    .get_json::<serde_json::Value>("test op", "thing", url)
                    .await
                    .unwrap_err()
            }
        };

        assert!(matches!(get("a").await, PrError::Unauthenticated(_)));
        assert!(matches!(get("b").await, PrError::NotFound { .. }));
        match get("c").await {
            PrError::Remote {
                status, message, ..
            } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "database unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_login_verifies_pat() {
        let mut server = mockito::Server::new_async().await;
        let _data = server
            .mock("GET", "/org/_apis/connectionData")
            .with_status(200)
            .with_body(r#"{"authenticatedUser":{"id":"u1","providerDisplayName":"Alice"},"instanceId":"i1"}"#)
            .create_async()
            .await;

        let identity = test_client(&server.url())
            .check_login(Some("https://dev.azure.com/org"))
            .await
            .unwrap();
        assert_eq!(identity.name, "Alice");
        assert_eq!(identity.kind, PAT_KIND);
    }

    #[tokio::test]
    async fn test_check_login_revoked_pat_is_unauthenticated() {
        let mut server = mockito::Server::new_async().await;
        let data = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = test_client(&server.url())
            .check_login(Some("org"))
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::Unauthenticated(_)));
        data.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_login_uses_configured_organization() {
        let mut server = mockito::Server::new_async().await;
        let data = server
            .mock("GET", "/contoso/_apis/connectionData")
            .with_status(200)
            .with_body(r#"{"authenticatedUser":{"providerDisplayName":"Bob"}}"#)
            .create_async()
            .await;
        let config = AzureConfig {
            api_base: server.url(),
            organization: Some("contoso".to_string()),
            ..AzureConfig::default()
        };
        let client = AdoClient::new(&config, Arc::new(PatSession::new("test-pat"))).unwrap();

        assert_eq!(client.check_login(None).await.unwrap().name, "Bob");
        data.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_login_pat_needs_organization() {
        let err = test_client("http://127.0.0.1:9").check_login(None).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let config = AzureConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            ..AzureConfig::default()
        };
        let client = AdoClient::new(&config, Arc::new(PatSession::new(""))).unwrap();
        let err = client.check_login(Some("org")).await.unwrap_err();
        assert!(matches!(err, PrError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_pat_sent_as_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // base64(":test-pat")
        let mock = server
            .mock("GET", "/org/_apis/ping")
            .match_header("authorization", "Basic OnRlc3QtcGF0")
            .match_query(mockito::Matcher::UrlEncoded(
                "api-version".into(),
                "7.1".into(),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let url = client.api_url("org", &["_apis", "ping"], &[]).unwrap();
        client
            .get_json::<serde_json::Value>("ping", "ping", url)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
