//! API types for the file store protocol.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::CacheOptions;

/// Folder or file id. Server ids are positive; temporary client ids are negative.
pub type NodeId = i64;

/// A file or folder in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: NodeId,

    /// Parent folder; `None` for the root.
    #[serde(default)]
    pub parent_id: Option<NodeId>,

    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_folder: bool,

    /// Size in bytes; the server sends `null` for folders.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,

    /// Physical backing is known to be missing.
    #[serde(default, deserialize_with = "null_as_default")]
    pub lost: bool,

    #[serde(default, alias = "uploadTime")]
    pub created_at: Option<NaiveDateTime>,

    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,

    /// Client-side placeholder awaiting server confirmation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_optimistic: bool,
}

impl FileNode {
    /// Placeholder row inserted before the server has assigned an id.
    pub fn placeholder(
        temp_id: NodeId,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
        size: u64,
        is_folder: bool,
    ) -> Self {
        Self {
            id: temp_id,
            parent_id,
            name: name.into(),
            is_folder,
            size,
            lost: false,
            created_at: None,
            updated_at: None,
            is_optimistic: true,
        }
    }

    /// A metadata record without physical backing: flagged lost, or a
    /// zero-byte file.
    pub fn is_lost(&self) -> bool {
        self.lost || (!self.is_folder && self.size == 0)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response from GET /files/quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    #[serde(default, deserialize_with = "null_as_default")]
    pub used_space: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_space: u64,
}

impl Quota {
    /// Used share of the total, in percent (0 when no total is configured).
    pub fn used_percent(&self) -> f64 {
        if self.total_space == 0 {
            return 0.0;
        }
        self.used_space as f64 / self.total_space as f64 * 100.0
    }
}

/// One breadcrumb entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub id: NodeId,
    pub name: String,
}

impl From<&FileNode> for Crumb {
    fn from(node: &FileNode) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
        }
    }
}

/// File content to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Binary payload from a download, zip or preview endpoint.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API (everything before `/files`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upload request timeout in seconds.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Maximum retries for idempotent reads.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds before a cached listing is considered stale.
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,

    /// Seconds an unobserved cache entry is retained.
    #[serde(default = "default_gc_secs")]
    pub gc_secs: u64,
}

fn default_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_upload_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_stale_secs() -> u64 {
    5 * 60
}

fn default_gc_secs() -> u64 {
    10 * 60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            timeout_secs: default_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            max_retries: default_max_retries(),
            stale_secs: default_stale_secs(),
            gc_secs: default_gc_secs(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CLOUDFOLD_URL` | API base URL |
    /// | `CLOUDFOLD_TOKEN` | Bearer token |
    /// | `CLOUDFOLD_TIMEOUT` | Request timeout in seconds |
    /// | `CLOUDFOLD_UPLOAD_TIMEOUT` | Upload timeout in seconds |
    /// | `CLOUDFOLD_MAX_RETRIES` | Retries for idempotent reads |
    /// | `CLOUDFOLD_STALE_SECS` | Cache stale time |
    /// | `CLOUDFOLD_GC_SECS` | Cache retention time |
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|v| v.parse().ok())
        }

        Self {
            url: std::env::var("CLOUDFOLD_URL").unwrap_or_else(|_| default_url()),
            token: std::env::var("CLOUDFOLD_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: parsed("CLOUDFOLD_TIMEOUT").unwrap_or_else(default_timeout),
            upload_timeout_secs: parsed("CLOUDFOLD_UPLOAD_TIMEOUT")
                .unwrap_or_else(default_upload_timeout),
            max_retries: parsed("CLOUDFOLD_MAX_RETRIES").unwrap_or_else(default_max_retries),
            stale_secs: parsed("CLOUDFOLD_STALE_SECS").unwrap_or_else(default_stale_secs),
            gc_secs: parsed("CLOUDFOLD_GC_SECS").unwrap_or_else(default_gc_secs),
        }
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the read retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set cache freshness and retention.
    pub fn with_cache_times(mut self, stale_secs: u64, gc_secs: u64) -> Self {
        self.stale_secs = stale_secs;
        self.gc_secs = gc_secs;
        self
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            stale_time: Duration::from_secs(self.stale_secs),
            gc_time: Duration::from_secs(self.gc_secs),
        }
    }
}
