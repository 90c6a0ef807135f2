//! REST client for the file store.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::auth::{SessionGuard, TokenProvider};
use crate::error::{ClientError, ClientResult};
use crate::types::{ClientConfig, Download, FileNode, NodeId, Quota, UploadFile};

mod helpers;
mod http;

use helpers::parse_content_disposition;
use http::HttpBackend;

const USER_AGENT_VALUE: &str = concat!("cloudfold-client/", env!("CARGO_PKG_VERSION"));

/// Transport seam between the cache layer and the server.
///
/// [`HttpFileClient`] is the production implementation; tests substitute an
/// in-memory store.
#[async_trait]
pub trait FileApi: Send + Sync {
    /// `GET /files?parentId=`
    async fn list(&self, parent_id: Option<NodeId>) -> ClientResult<Vec<FileNode>>;

    /// `GET /files/path/:id`, ordered root → leaf, including `id` itself.
    async fn ancestor_path(&self, id: NodeId) -> ClientResult<Vec<FileNode>>;

    /// `GET /files/quota`
    async fn quota(&self) -> ClientResult<Quota>;

    /// `POST /files/upload`
    async fn upload(&self, parent_id: Option<NodeId>, file: UploadFile) -> ClientResult<FileNode>;

    /// `POST /files/folder`
    async fn create_folder(&self, parent_id: Option<NodeId>, name: &str)
        -> ClientResult<FileNode>;

    /// `PUT /files/:id/rename`
    async fn rename(&self, id: NodeId, new_name: &str) -> ClientResult<FileNode>;

    /// `DELETE /files/:id`
    async fn delete(&self, id: NodeId) -> ClientResult<()>;

    /// `GET /files/:id/download`
    async fn download(&self, id: NodeId) -> ClientResult<Download>;

    /// `GET /files/:id/download-zip`
    async fn download_zip(&self, id: NodeId) -> ClientResult<Download>;

    /// `GET /files/:id/preview`
    async fn preview(&self, id: NodeId) -> ClientResult<Download>;
}

/// reqwest-backed [`FileApi`].
#[derive(Debug, Clone)]
pub struct HttpFileClient {
    http: HttpBackend,
}

impl HttpFileClient {
    pub fn new(config: ClientConfig, session: SessionGuard) -> ClientResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider, session)
    }

    pub fn with_token_provider(
        config: ClientConfig,
        token_provider: TokenProvider,
        session: SessionGuard,
    ) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        // Trailing slash so that `join("files")` appends instead of replacing.
        let base = format!("{}/", config.url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| ClientError::Config {
            message: format!("invalid base URL {}: {}", config.url, e),
        })?;

        Ok(Self {
            http: HttpBackend {
                client,
                base_url,
                token_provider,
                session,
                config,
            },
        })
    }

    pub fn from_env(session: SessionGuard) -> ClientResult<Self> {
        Self::new(ClientConfig::from_env(), session)
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url.as_str()
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.token_provider.is_authenticated()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> ClientResult<T> {
        debug!(url = %url, "fetching {}", what);
        let response = self.http.get(&url).await?;
        decode_json(response, what).await
    }

    async fn get_binary(&self, url: Url, fallback_name: String) -> ClientResult<Download> {
        debug!(url = %url, "downloading");
        let response = self.http.get(&url).await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition)
            .unwrap_or(fallback_name);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await.map_err(|e| ClientError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        Ok(Download {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response, what: &str) -> ClientResult<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse {
            message: format!("failed to parse {}: {}", what, e),
        })
}

#[async_trait]
impl FileApi for HttpFileClient {
    async fn list(&self, parent_id: Option<NodeId>) -> ClientResult<Vec<FileNode>> {
        let mut url = self.http.url("files")?;
        let parent = parent_id.map(|p| p.to_string()).unwrap_or_default();
        url.query_pairs_mut().append_pair("parentId", &parent);
        self.get_json(url, "file listing").await
    }

    async fn ancestor_path(&self, id: NodeId) -> ClientResult<Vec<FileNode>> {
        let url = self.http.url(&format!("files/path/{}", id))?;
        self.get_json(url, "ancestor path").await
    }

    async fn quota(&self) -> ClientResult<Quota> {
        let url = self.http.url("files/quota")?;
        self.get_json(url, "quota").await
    }

    async fn upload(&self, parent_id: Option<NodeId>, file: UploadFile) -> ClientResult<FileNode> {
        let url = self.http.url("files/upload")?;
        debug!(url = %url, name = %file.name, size = file.size(), "uploading file");

        let mut part = Part::bytes(file.bytes).file_name(file.name);
        if let Some(mime) = file.content_type.as_deref() {
            part = part.mime_str(mime).map_err(|e| ClientError::validation(format!(
                "invalid content type {}: {}",
                mime, e
            )))?;
        }
        let mut form = Form::new().part("file", part);
        if let Some(parent) = parent_id {
            form = form.text("parentId", parent.to_string());
        }

        let request = self
            .http
            .client
            .post(url)
            .timeout(Duration::from_secs(self.http.config.upload_timeout_secs))
            .multipart(form);
        let response = self.http.execute(request).await?;
        decode_json(response, "uploaded file").await
    }

    async fn create_folder(
        &self,
        parent_id: Option<NodeId>,
        name: &str,
    ) -> ClientResult<FileNode> {
        let url = self.http.url("files/folder")?;
        debug!(url = %url, name, parent = ?parent_id, "creating folder");

        let request = self
            .http
            .client
            .post(url)
            .json(&json!({ "name": name, "parentId": parent_id }));
        let response = self.http.execute(request).await?;
        decode_json(response, "created folder").await
    }

    async fn rename(&self, id: NodeId, new_name: &str) -> ClientResult<FileNode> {
        let url = self.http.url(&format!("files/{}/rename", id))?;
        debug!(url = %url, new_name, "renaming");

        let request = self
            .http
            .client
            .put(url)
            .json(&json!({ "newName": new_name }));
        let response = self.http.execute(request).await?;
        decode_json(response, "renamed file").await
    }

    async fn delete(&self, id: NodeId) -> ClientResult<()> {
        let url = self.http.url(&format!("files/{}", id))?;
        debug!(url = %url, "deleting");

        self.http.execute(self.http.client.delete(url)).await?;
        Ok(())
    }

    async fn download(&self, id: NodeId) -> ClientResult<Download> {
        let url = self.http.url(&format!("files/{}/download", id))?;
        self.get_binary(url, "download".to_string()).await
    }

    async fn download_zip(&self, id: NodeId) -> ClientResult<Download> {
        let url = self.http.url(&format!("files/{}/download-zip", id))?;
        self.get_binary(url, "folder.zip".to_string()).await
    }

    async fn preview(&self, id: NodeId) -> ClientResult<Download> {
        let url = self.http.url(&format!("files/{}/preview", id))?;
        self.get_binary(url, "preview".to_string()).await
    }
}
