//! One object per session: cache, mutations and navigation wired together.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::auth::SessionGuard;
use crate::cache::Subscription;
use crate::client::{FileApi, HttpFileClient};
use crate::error::ClientResult;
use crate::keys::{KeyPattern, QueryData, QueryKey};
use crate::mutation::{FileCache, MutationCoordinator, MutationOutcome, MutationRequest, PendingMutation};
use crate::navigation::{NavigationOutcome, NavigationStateMachine, NavigationView};
use crate::queries::Queries;
use crate::types::{ClientConfig, Crumb, Download, FileNode, NodeId, Quota, UploadFile};

/// Entry point for a UI or the CLI.
///
/// ```no_run
/// use cloudfold_client::{ClientConfig, FileStore, SessionGuard, UploadFile};
///
/// # async fn example() -> Result<(), cloudfold_client::ClientError> {
/// let session = SessionGuard::new(|| eprintln!("signed out"));
/// let store = FileStore::new(ClientConfig::from_env(), session)?;
///
/// store.navigate_to(Some(5)).await;
/// let outcome = store
///     .upload(Some(5), UploadFile::new("notes.txt", b"hello".to_vec()))
///     .await;
/// if let Some(message) = outcome.message() {
///     eprintln!("{}", message);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileStore {
    queries: Queries,
    mutations: MutationCoordinator,
    navigation: NavigationStateMachine,
    session: SessionGuard,
    quota_watch: Mutex<Option<Subscription<QueryKey, QueryData>>>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("cache", self.queries.cache())
            .field("navigation", &self.navigation)
            .field("mutations", &self.mutations)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Store backed by the REST API at `config.url`.
    pub fn new(config: ClientConfig, session: SessionGuard) -> ClientResult<Self> {
        let client = HttpFileClient::new(config.clone(), session.clone())?;
        Ok(Self::with_api(Arc::new(client), config, session))
    }

    /// Store backed by any [`FileApi`].
    pub fn with_api(api: Arc<dyn FileApi>, config: ClientConfig, session: SessionGuard) -> Self {
        let options = config.cache_options();
        let cache = FileCache::new(options);
        let queries = Queries::new(api.clone(), cache.clone(), options);
        let mutations = MutationCoordinator::new(api, cache.clone());
        let navigation = NavigationStateMachine::new(queries.clone());
        // The quota is always on screen, so keep it subscribed.
        let quota_watch = Mutex::new(Some(cache.subscribe(&QueryKey::Quota)));

        Self {
            queries,
            mutations,
            navigation,
            session,
            quota_watch,
        }
    }

    pub fn cache(&self) -> &FileCache {
        self.queries.cache()
    }

    pub fn is_session_expired(&self) -> bool {
        self.session.is_expired()
    }

    pub async fn navigate_to(&self, target: Option<NodeId>) -> NavigationOutcome {
        self.navigation.navigate_to(target).await
    }

    pub fn view(&self) -> NavigationView {
        self.navigation.view()
    }

    /// Listing of a folder (`None` = root), served from the cache when fresh.
    pub async fn files(&self, parent_id: Option<NodeId>) -> ClientResult<Vec<FileNode>> {
        let key = QueryKey::Files(parent_id);
        let _ = self.cache().settled(&key).await;
        self.queries.files(parent_id).await
    }

    /// Breadcrumb chain of a folder.
    pub async fn path(&self, id: NodeId) -> ClientResult<Vec<Crumb>> {
        self.queries.path(id).await
    }

    /// Storage usage, waiting for a refresh already under way.
    pub async fn quota(&self) -> ClientResult<Quota> {
        let _ = self.cache().settled(&QueryKey::Quota).await;
        self.queries.quota().await
    }

    pub async fn upload(&self, parent_id: Option<NodeId>, file: UploadFile) -> MutationOutcome {
        self.mutations
            .submit(MutationRequest::Upload { parent_id, file })
            .await
    }

    pub async fn create_folder(
        &self,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
    ) -> MutationOutcome {
        self.mutations
            .submit(MutationRequest::CreateFolder {
                parent_id,
                name: name.into(),
            })
            .await
    }

    pub async fn rename(&self, node: &FileNode, new_name: impl Into<String>) -> MutationOutcome {
        self.mutations
            .submit(MutationRequest::rename(node, new_name))
            .await
    }

    pub async fn delete(&self, node: &FileNode) -> MutationOutcome {
        self.mutations.submit(MutationRequest::delete(node)).await
    }

    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.mutations.pending()
    }

    pub async fn download(&self, id: NodeId) -> ClientResult<Download> {
        self.queries.api().download(id).await
    }

    pub async fn download_folder_zip(&self, id: NodeId) -> ClientResult<Download> {
        self.queries.api().download_zip(id).await
    }

    pub async fn preview(&self, id: NodeId) -> ClientResult<Download> {
        self.queries.api().preview(id).await
    }

    /// Refetch the visible listing and the quota.
    pub fn refresh(&self) -> usize {
        let quota = KeyPattern::Exact(QueryKey::Quota);
        self.navigation.refresh() + self.cache().invalidate(|k| quota.matches(k))
    }

    /// Unmount: stop observing, fence pending navigations, drop idle entries.
    pub fn close(&self) {
        self.navigation.close();
        self.quota_watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let evicted = self.cache().collect_garbage();
        debug!(evicted, "file store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationStatus;
    use crate::testing::{folder, node, FakeApi};

    fn store(api: &Arc<FakeApi>) -> FileStore {
        FileStore::with_api(api.clone(), ClientConfig::default(), SessionGuard::detached())
    }

    #[tokio::test]
    async fn test_upload_grows_quota_after_refetch() {
        let api = FakeApi::new().with_next_id(42);
        api.insert(folder(5, None, "inbox"));
        let store = store(&api);

        let before = store.quota().await.unwrap().used_space;
        store.navigate_to(Some(5)).await;

        let outcome = store
            .upload(Some(5), UploadFile::new("report.pdf", vec![0u8; 2_097_152]))
            .await;
        assert!(outcome.is_committed());

        let after = store.quota().await.unwrap().used_space;
        assert_eq!(after - before, 2_097_152);

        let _ = store.cache().settled(&QueryKey::Files(Some(5))).await;
        let view = store.view();
        assert_eq!(view.listing.len(), 1);
        assert_eq!(view.listing[0].id, 42);
    }

    #[tokio::test]
    async fn test_delete_normal_file_shrinks_quota() {
        let api = FakeApi::new();
        api.insert(node(10, Some(5), "a.txt", 2048));
        api.insert(node(12, Some(5), "b.txt", 100));
        let store = store(&api);

        let before = store.quota().await.unwrap().used_space;
        let files = store.files(Some(5)).await.unwrap();
        let target = files.iter().find(|f| f.id == 10).unwrap().clone();

        let outcome = store.delete(&target).await;
        assert!(outcome.is_committed());
        assert!(store.files(Some(5)).await.unwrap().iter().all(|f| f.id != 10));
        assert_eq!(before - store.quota().await.unwrap().used_space, 2048);
    }

    #[tokio::test]
    async fn test_delete_lost_record_leaves_quota() {
        let api = FakeApi::new();
        let mut lost = node(11, Some(5), "gone.bin", 0);
        lost.lost = true;
        api.insert(lost.clone());
        api.insert(node(12, Some(5), "b.txt", 100));
        let store = store(&api);

        let before = store.quota().await.unwrap();
        let outcome = store.delete(&lost).await;
        assert!(outcome.is_committed());
        assert_eq!(store.quota().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_mutation_reports_message() {
        let api = FakeApi::new();
        let store = store(&api);
        let ghost = node(99, None, "ghost.txt", 1);

        let outcome = store.rename(&ghost, "still-ghost.txt").await;
        assert_eq!(outcome.status, MutationStatus::RolledBack);
        assert_eq!(
            outcome.message().as_deref(),
            Some("rename failed: File not found: 99")
        );
    }

    #[tokio::test]
    async fn test_refresh_refetches_visible_listing() {
        let api = FakeApi::new();
        let store = store(&api);
        store.navigate_to(None).await;
        assert!(store.view().listing.is_empty());

        api.insert(node(1, None, "external.txt", 3));
        store.refresh();
        let _ = store.cache().settled(&QueryKey::Files(None)).await;

        assert_eq!(store.view().listing.len(), 1);
        assert_eq!(api.calls("list:root"), 2);
    }

    #[tokio::test]
    async fn test_breadcrumbs_follow_folder_rename() {
        let api = FakeApi::new();
        api.insert(folder(7, None, "A"));
        api.insert(folder(9, Some(7), "B"));
        let store = store(&api);

        store.navigate_to(Some(9)).await;
        store.navigate_to(None).await;
        let outcome = store.rename(&folder(7, None, "A"), "Renamed").await;
        assert!(outcome.is_committed());
        assert_eq!(store.view().listing[0].name, "Renamed");

        let again = store.navigate_to(Some(9)).await;
        let names: Vec<&str> = again
            .view()
            .unwrap()
            .breadcrumbs
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Renamed", "B"]);
        assert_eq!(api.calls("path:9"), 2);
    }

    #[tokio::test]
    async fn test_upload_committed_during_first_listing_fetch_is_shown() {
        let api = FakeApi::new().with_next_id(42);
        api.insert(folder(5, None, "inbox"));
        let store = Arc::new(store(&api));

        api.hold("list:5");
        let navigation = {
            let store = store.clone();
            tokio::spawn(async move { store.navigate_to(Some(5)).await })
        };
        api.wait_for_call("list:5").await;

        let outcome = store
            .upload(Some(5), UploadFile::new("report.pdf", vec![0u8; 16]))
            .await;
        assert!(outcome.is_committed());

        api.open("list:5");
        assert!(navigation.await.unwrap().view().is_some());
        let _ = store.cache().settled(&QueryKey::Files(Some(5))).await;

        let view = store.view();
        assert_eq!(view.listing.len(), 1, "committed upload missing from the view");
        assert_eq!(view.listing[0].id, 42);
        let cached = store
            .cache()
            .get(&QueryKey::Files(Some(5)))
            .and_then(QueryData::into_files)
            .unwrap_or_default();
        assert_eq!(cached.iter().map(|f| f.id).collect::<Vec<_>>(), vec![42]);
    }

    #[tokio::test]
    async fn test_downloads_pass_through() {
        let api = FakeApi::new();
        api.insert(node(1, None, "a.txt", 4));
        api.insert(folder(2, None, "Docs"));
        let store = store(&api);

        assert_eq!(store.download(1).await.unwrap().bytes.len(), 4);
        assert_eq!(store.download_folder_zip(2).await.unwrap().file_name, "Docs.zip");
        assert_eq!(store.preview(1).await.unwrap().bytes, b"a.txt");
    }
}
