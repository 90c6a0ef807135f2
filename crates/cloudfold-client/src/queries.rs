//! Typed reads through the shared cache.

use std::sync::Arc;

use futures::FutureExt;

use crate::cache::{CacheOptions, Fetcher};
use crate::client::FileApi;
use crate::error::{ClientError, ClientResult};
use crate::keys::{QueryData, QueryKey};
use crate::mutation::FileCache;
use crate::types::{Crumb, FileNode, NodeId, Quota};

/// Builds fetchers from a [`FileApi`] and reads them through the cache.
#[derive(Clone)]
pub struct Queries {
    api: Arc<dyn FileApi>,
    cache: FileCache,
    options: CacheOptions,
}

impl std::fmt::Debug for Queries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queries")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Queries {
    pub fn new(api: Arc<dyn FileApi>, cache: FileCache, options: CacheOptions) -> Self {
        Self {
            api,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn api(&self) -> &Arc<dyn FileApi> {
        &self.api
    }

    /// Fetcher for a key, as registered with the cache.
    pub fn fetcher(&self, key: QueryKey) -> Fetcher<QueryData> {
        let api = self.api.clone();
        Arc::new(move || {
            let api = api.clone();
            async move {
                match key {
                    QueryKey::Files(parent) => api.list(parent).await.map(QueryData::Files),
                    QueryKey::Quota => api.quota().await.map(QueryData::Quota),
                    QueryKey::Path(id) => {
                        let chain = api.ancestor_path(id).await?;
                        Ok(QueryData::Path(chain.iter().map(Crumb::from).collect()))
                    }
                }
            }
            .boxed()
        })
    }

    /// Read `key`, preferring the stored value (which carries pending
    /// optimistic patches) over the raw fetch result.
    async fn read(&self, key: QueryKey) -> ClientResult<QueryData> {
        let fetched = self
            .cache
            .read(&key, self.fetcher(key), self.options)
            .await?;
        Ok(self.cache.get(&key).unwrap_or(fetched))
    }

    pub async fn files(&self, parent_id: Option<NodeId>) -> ClientResult<Vec<FileNode>> {
        self.read(QueryKey::Files(parent_id))
            .await?
            .into_files()
            .ok_or_else(|| mismatch(QueryKey::Files(parent_id)))
    }

    pub async fn path(&self, id: NodeId) -> ClientResult<Vec<Crumb>> {
        self.read(QueryKey::Path(id))
            .await?
            .into_path()
            .ok_or_else(|| mismatch(QueryKey::Path(id)))
    }

    /// Breadcrumb chain fetched from the server even when a cached one is
    /// fresh. The result is stored for later [`Queries::path`] reads.
    pub async fn fresh_path(&self, id: NodeId) -> ClientResult<Vec<Crumb>> {
        let key = QueryKey::Path(id);
        self.cache
            .refetch(&key, self.fetcher(key), self.options)
            .await?
            .into_path()
            .ok_or_else(|| mismatch(key))
    }

    pub async fn quota(&self) -> ClientResult<Quota> {
        self.read(QueryKey::Quota)
            .await?
            .into_quota()
            .ok_or_else(|| mismatch(QueryKey::Quota))
    }
}

fn mismatch(key: QueryKey) -> ClientError {
    ClientError::InvalidResponse {
        message: format!("cached value for {} has the wrong shape", key),
    }
}
