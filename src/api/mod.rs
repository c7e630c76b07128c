//! HTTP layer for the Filevine v2 API
//!
//! [`ApiClient`] attaches the bearer token and session headers, retries
//! transient failures with backoff, refreshes the token once on a 401 and
//! decodes JSON envelopes. It implements the walker's [`FolderListing`] and
//! the scheduler's [`ContentSource`].

pub mod wire;

use crate::auth::{AccessToken, TokenProvider, excerpt};
use crate::config::{ApiConfig, Config, RetryConfig};
use crate::error::{AuthError, Error, Result};
use crate::retry::with_retry;
use crate::scheduler::ContentSource;
use crate::tree::{ContentRef, RemoteId};
use crate::walker::{FolderListing, FolderRef};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub use wire::{ItemKind, ListingItem, Locator, Page, Session};

/// Streamed document content
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Authenticated client for the Filevine API
pub struct ApiClient {
    http: reqwest::Client,
    api_root: Url,
    tokens: Arc<TokenProvider>,
    retry: RetryConfig,
    request_timeout: Duration,
    download_timeout: Duration,
    page_size: usize,
    session: tokio::sync::OnceCell<Session>,
}

impl ApiClient {
    /// Create a client for the API root named in `config`
    pub fn new(http: reqwest::Client, config: &Config, tokens: Arc<TokenProvider>) -> Result<Self> {
        let ApiConfig {
            api_root,
            request_timeout,
            download_timeout,
            page_size,
            ..
        } = &config.api;

        // A trailing slash makes Url::join append instead of replacing the last segment
        let mut root = api_root.trim_end_matches('/').to_string();
        root.push('/');
        let api_root = Url::parse(&root)
            .map_err(|e| Error::config("api.api_root", format!("invalid URL: {e}")))?;

        Ok(Self {
            http,
            api_root,
            tokens,
            retry: config.retry.clone(),
            request_timeout: *request_timeout,
            download_timeout: *download_timeout,
            page_size: *page_size,
            session: tokio::sync::OnceCell::new(),
        })
    }

    /// The token provider backing this client
    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Resolve (once) the org and user ids the token acts for
    pub async fn resolve_session(&self) -> Result<Session> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let info: serde_json::Value = self
                    .request_json(Method::POST, "utils/GetUserOrgsWithToken", &[], None)
                    .await?;
                let session = Session::from_response(&info)?;
                tracing::info!(
                    org_id = %session.org_id,
                    user_id = %session.user_id,
                    "Session resolved"
                );
                Ok::<_, Error>(session)
            })
            .await?;
        Ok(session.clone())
    }

    /// Send an authorized API request and return the successful response
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        with_retry(&self.retry, || {
            let method = method.clone();
            let url = url.clone();
            async move {
                self.send_authorized(method, url, query, body, self.request_timeout)
                    .await
            }
        })
        .await
    }

    /// Send an authorized API request and decode its JSON body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let response = self.request(method, path, query, body).await?;
        let raw = response.bytes().await.map_err(Error::from_reqwest)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Stream the bytes behind `target`
    ///
    /// `target` is either an API path or an absolute URL. Absolute URLs outside
    /// the API root (pre-signed storage links) are fetched without the bearer
    /// token.
    pub async fn download_bytes(&self, target: &str) -> Result<ByteStream> {
        let url = self.endpoint(target)?;
        let authorized = url.as_str().starts_with(self.api_root.as_str());

        let response = with_retry(&self.retry, || {
            let url = url.clone();
            async move {
                if authorized {
                    self.send_authorized(Method::GET, url, &[], None, self.download_timeout)
                        .await
                } else {
                    let label = url.to_string();
                    let response = self
                        .send_once(&Method::GET, url, &[], None, None, self.download_timeout)
                        .await?;
                    // Storage links are not ours to refresh: a 401 there is per-document
                    check_status(response, &label).await.map_err(|e| match e {
                        Error::Auth(auth) => Error::Request {
                            status: auth.status.unwrap_or(401),
                            path: label.clone(),
                            message: auth.message,
                        },
                        other => other,
                    })
                }
            }
        })
        .await?;

        Ok(response
            .bytes_stream()
            .map_err(Error::from_reqwest)
            .boxed())
    }

    fn endpoint(&self, target: &str) -> Result<Url> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Url::parse(target).map_err(|e| Error::Request {
                status: 0,
                path: target.to_string(),
                message: format!("invalid URL: {e}"),
            });
        }
        self.api_root
            .join(target.trim_start_matches('/'))
            .map_err(|e| Error::Request {
                status: 0,
                path: target.to_string(),
                message: format!("invalid path: {e}"),
            })
    }

    /// One attempt of an authorized call, with a single token refresh on 401
    async fn send_authorized(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let label = url.path().to_string();
        let token = self.tokens.get_token().await?;
        let response = self
            .send_once(&method, url.clone(), query, body, Some(&token), timeout)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, &label).await;
        }

        tracing::warn!(path = %label, "Access token rejected, refreshing");
        self.tokens.invalidate(&token);
        let token = self.tokens.get_token().await?;
        let response = self
            .send_once(&method, url, query, body, Some(&token), timeout)
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::with_status(
                401,
                format!("{label} rejected a freshly issued token"),
            )
            .into());
        }
        check_status(response, &label).await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        token: Option<&AccessToken>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .timeout(timeout)
            .query(query);

        if let Some(token) = token {
            request = request
                .bearer_auth(token.value())
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(session) = self.session.get() {
                request = request
                    .header("x-fv-orgid", &session.org_id)
                    .header("x-fv-userid", &session.user_id);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(Error::from_reqwest)
    }
}

/// Map a response status onto the error taxonomy
async fn check_status(response: reqwest::Response, label: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = excerpt(&body).to_string();

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(Error::Transient {
            status: Some(status.as_u16()),
            message: format!("{label} returned {status}"),
        });
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(AuthError::with_status(401, format!("{label} returned 401: {message}")).into());
    }
    Err(Error::Request {
        status: status.as_u16(),
        path: label.to_string(),
        message,
    })
}

#[async_trait::async_trait]
impl FolderListing for ApiClient {
    async fn list_page(
        &self,
        project_id: &str,
        folder: &FolderRef,
        cursor: Option<&str>,
    ) -> Result<Page<ListingItem>> {
        let folder_segment = match folder {
            FolderRef::Root => "root".to_string(),
            FolderRef::Id(id) => urlencoding::encode(id.as_str()).into_owned(),
        };
        let path = format!("Folders/{folder_segment}/children");

        let mut query = vec![
            ("projectId", project_id.to_string()),
            ("limit", self.page_size.to_string()),
            ("includeArchivedFolders", "false".to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        self.request_json(Method::GET, &path, &query, None).await
    }
}

#[async_trait::async_trait]
impl ContentSource for ApiClient {
    async fn fetch(&self, content: &ContentRef) -> Result<ByteStream> {
        match content {
            ContentRef::Direct(url) => self.download_bytes(url).await,
            ContentRef::Locator(id) => {
                let locator = self.locate(id).await?;
                self.download_bytes(&locator.url).await
            }
        }
    }
}

impl ApiClient {
    async fn locate(&self, id: &RemoteId) -> Result<Locator> {
        let path = format!("Documents/{}/locator", urlencoding::encode(id.as_str()));
        self.request_json(Method::GET, &path, &[], None).await
    }
}
