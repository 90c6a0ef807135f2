//! Optimistic mutations with reconcile-or-rollback.
//!
//! [`MutationCoordinator::submit`] runs one mutation through a fixed protocol:
//!
//! 1. wait for the target's lane (same-entity mutations are serialized)
//! 2. detach in-flight reads of a cached parent listing and snapshot it
//! 3. apply the optimistic patch synchronously
//! 4. call the server
//! 5. success: replace optimistic values with the server's (`Committed`);
//!    failure: put the snapshot back (`RolledBack`)
//! 6. invalidate the parent listing and the quota either way
//!
//! While a mutation is pending its patch is also re-applied on top of any
//! listing fetched in the meantime, so a refetch never erases it early. A
//! listing with no cached value keeps its first fetch attached for the same
//! reason: the response is stored with the pending patches on top.
//!
//! Ids of committed deletes are remembered until a refetched parent listing
//! confirms them gone, so a rename that was queued behind the delete can be
//! recognised as [`MutationStatus::Discarded`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::client::FileApi;
use crate::error::{ClientError, ClientResult};
use crate::invalidation::{patterns_for, MutationKind};
use crate::keys::{QueryData, QueryKey};
use crate::types::{FileNode, NodeId, UploadFile};

/// The cache shared by the coordinator, navigator and store.
pub type FileCache = QueryCache<QueryKey, QueryData>;

pub type MutationId = u64;

/// Temporary ids are negative and never reused within a process.
static NEXT_TEMP_ID: AtomicI64 = AtomicI64::new(-1);

fn next_temp_id() -> NodeId {
    NEXT_TEMP_ID.fetch_sub(1, Ordering::Relaxed)
}

/// What the caller asks for.
#[derive(Debug, Clone)]
pub enum MutationRequest {
    Upload {
        parent_id: Option<NodeId>,
        file: UploadFile,
    },
    CreateFolder {
        parent_id: Option<NodeId>,
        name: String,
    },
    Rename {
        id: NodeId,
        parent_id: Option<NodeId>,
        new_name: String,
    },
    Delete {
        id: NodeId,
        parent_id: Option<NodeId>,
    },
}

impl MutationRequest {
    pub fn rename(node: &FileNode, new_name: impl Into<String>) -> Self {
        Self::Rename {
            id: node.id,
            parent_id: node.parent_id,
            new_name: new_name.into(),
        }
    }

    pub fn delete(node: &FileNode) -> Self {
        Self::Delete {
            id: node.id,
            parent_id: node.parent_id,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Upload { .. } => MutationKind::Upload,
            Self::CreateFolder { .. } => MutationKind::CreateFolder,
            Self::Rename { .. } => MutationKind::Rename,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Existing entity the mutation targets; `None` for creations.
    pub fn target_id(&self) -> Option<NodeId> {
        match self {
            Self::Rename { id, .. } | Self::Delete { id, .. } => Some(*id),
            Self::Upload { .. } | Self::CreateFolder { .. } => None,
        }
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        match self {
            Self::Upload { parent_id, .. }
            | Self::CreateFolder { parent_id, .. }
            | Self::Rename { parent_id, .. }
            | Self::Delete { parent_id, .. } => *parent_id,
        }
    }

    /// Reject what the server would reject anyway, before touching the cache.
    fn normalized(self) -> ClientResult<Self> {
        match self {
            Self::CreateFolder { parent_id, name } => Ok(Self::CreateFolder {
                parent_id,
                name: non_empty(&name, "folder name")?,
            }),
            Self::Rename {
                id,
                parent_id,
                new_name,
            } => Ok(Self::Rename {
                id,
                parent_id,
                new_name: non_empty(&new_name, "name")?,
            }),
            Self::Upload { parent_id, file } => {
                non_empty(&file.name, "file name")?;
                Ok(Self::Upload { parent_id, file })
            }
            other => Ok(other),
        }
    }
}

fn non_empty(name: &str, what: &str) -> ClientResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ClientError::validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

/// Expected effect of a mutation on its parent listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticPatch {
    /// Placeholder row with a temporary id.
    Insert(FileNode),
    Remove { id: NodeId },
    Rename { id: NodeId, name: String },
}

impl OptimisticPatch {
    /// Apply to a listing. Idempotent.
    pub fn apply(&self, files: &[FileNode]) -> Vec<FileNode> {
        match self {
            Self::Insert(node) => {
                let mut out = files.to_vec();
                if !out.iter().any(|f| f.id == node.id) {
                    out.push(node.clone());
                }
                out
            }
            Self::Remove { id } => files.iter().filter(|f| f.id != *id).cloned().collect(),
            Self::Rename { id, name } => files
                .iter()
                .map(|f| {
                    let mut f = f.clone();
                    if f.id == *id {
                        f.name = name.clone();
                    }
                    f
                })
                .collect(),
        }
    }

    /// Undo this patch on `files`, using `before` (the snapshot) for the
    /// values it overwrote.
    fn revert(&self, files: &[FileNode], before: &[FileNode]) -> Vec<FileNode> {
        match self {
            Self::Insert(node) => files.iter().filter(|f| f.id != node.id).cloned().collect(),
            Self::Remove { id } => {
                let mut out = files.to_vec();
                let original = before.iter().position(|f| f.id == *id);
                if let Some(index) = original {
                    if !out.iter().any(|f| f.id == *id) {
                        out.insert(index.min(out.len()), before[index].clone());
                    }
                }
                out
            }
            Self::Rename { id, name } => {
                let old_name = before.iter().find(|f| f.id == *id).map(|f| f.name.clone());
                files
                    .iter()
                    .map(|f| {
                        let mut f = f.clone();
                        if let Some(old) = &old_name {
                            if f.id == *id && f.name == *name {
                                f.name = old.clone();
                            }
                        }
                        f
                    })
                    .collect()
            }
        }
    }
}

fn map_listing<F>(data: Option<&QueryData>, f: F) -> Option<QueryData>
where
    F: FnOnce(&[FileNode]) -> Vec<FileNode>,
{
    match data {
        Some(QueryData::Files(files)) => Some(QueryData::Files(f(files))),
        other => other.cloned(),
    }
}

/// Lifecycle of a submitted mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// Patch visible, server call outstanding.
    Applied,
    /// Server answered, cache being updated.
    Reconciling,
    Committed,
    RolledBack,
    /// Server said yes, but a conflicting mutation already won.
    Discarded,
}

impl MutationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Discarded)
    }
}

/// A mutation between `submit` and its terminal status.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub target_id: Option<NodeId>,
    pub parent_id: Option<NodeId>,
    pub patch: OptimisticPatch,
    /// Pre-mutation value of every entry the patch touches.
    pub snapshot: Vec<(QueryKey, Option<QueryData>)>,
    pub status: MutationStatus,
    /// Entry version right after the patch was written.
    patched_version: u64,
}

/// Result of a submitted mutation. Never an `Err`: failures are rolled back
/// and described here.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub id: MutationId,
    pub kind: MutationKind,
    pub target_id: Option<NodeId>,
    pub status: MutationStatus,
    /// Server-confirmed node (upload, create-folder, rename).
    pub node: Option<FileNode>,
    pub error: Option<ClientError>,
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        self.status == MutationStatus::Committed
    }

    /// Message for the user when the mutation did not go through.
    pub fn message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{} failed: {}", self.kind, e.user_message()))
    }
}

type Lane = Arc<tokio::sync::Mutex<()>>;
type Lanes = Arc<Mutex<HashMap<NodeId, Lane>>>;

/// Committed deletes: id → parent listing it was removed from.
type Tombstones = Arc<Mutex<HashMap<NodeId, Option<NodeId>>>>;

/// Runs mutations against the server and keeps the cache in step.
pub struct MutationCoordinator {
    api: Arc<dyn FileApi>,
    cache: FileCache,
    pending: Arc<Mutex<Vec<PendingMutation>>>,
    lanes: Lanes,
    deleted: Tombstones,
    next_id: AtomicU64,
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("pending", &lock(&self.pending).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MutationCoordinator {
    /// Create a coordinator and hook its pending patches into `cache`.
    pub fn new(api: Arc<dyn FileApi>, cache: FileCache) -> Self {
        let pending: Arc<Mutex<Vec<PendingMutation>>> = Arc::default();
        let lanes: Lanes = Arc::default();
        let deleted: Tombstones = Arc::default();

        let ledger = pending.clone();
        let busy = lanes.clone();
        let tombstones = deleted.clone();
        cache.set_overlay(Arc::new(move |key: &QueryKey, data: QueryData| match (key, data) {
            (QueryKey::Files(parent), QueryData::Files(files)) => {
                forget_confirmed_deletes(&tombstones, &busy, *parent, &files);
                let pending = lock(&ledger);
                let files = pending
                    .iter()
                    .filter(|m| m.parent_id == *parent && !m.status.is_terminal())
                    .fold(files, |files, m| m.patch.apply(&files));
                QueryData::Files(files)
            }
            (_, data) => data,
        }));

        Self {
            api,
            cache,
            pending,
            lanes,
            deleted,
            next_id: AtomicU64::new(1),
        }
    }

    /// Mutations that have not reached a terminal status.
    pub fn pending(&self) -> Vec<PendingMutation> {
        lock(&self.pending).clone()
    }

    fn lane(&self, id: NodeId) -> Lane {
        lock(&self.lanes).entry(id).or_default().clone()
    }

    fn release_lane(&self, id: NodeId) {
        let mut lanes = lock(&self.lanes);
        if lanes.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            lanes.remove(&id);
        }
    }

    /// Whether a committed delete of `id` is still remembered.
    pub fn is_tombstoned(&self, id: NodeId) -> bool {
        lock(&self.deleted).contains_key(&id)
    }

    pub async fn submit(&self, request: MutationRequest) -> MutationOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind();
        let target_id = request.target_id();

        let request = match request.normalized() {
            Ok(request) => request,
            Err(error) => {
                // Nothing was applied or sent, so there is nothing to invalidate.
                debug!(mutation = id, %kind, error = %error, "mutation rejected locally");
                return MutationOutcome {
                    id,
                    kind,
                    target_id,
                    status: MutationStatus::RolledBack,
                    node: None,
                    error: Some(error),
                };
            }
        };

        let guard = match target_id {
            Some(target) => Some(self.lane(target).lock_owned().await),
            None => None,
        };

        let parent_id = request.parent_id();
        let patch = optimistic_patch(&request);
        self.apply(id, kind, target_id, parent_id, patch);

        let result = self.call(request).await;
        self.set_status(id, MutationStatus::Reconciling);

        let mut outcome = MutationOutcome {
            id,
            kind,
            target_id,
            status: MutationStatus::Committed,
            node: None,
            error: None,
        };
        match result {
            Ok(node) => {
                outcome.status = self.commit(id, node.as_ref());
                outcome.node = node;
            }
            Err(error) => {
                self.roll_back(id, &error);
                outcome.status = MutationStatus::RolledBack;
                outcome.error = Some(error);
            }
        }

        for pattern in patterns_for(kind, parent_id) {
            self.cache.invalidate(|key| pattern.matches(key));
        }

        drop(guard);
        if let Some(target) = target_id {
            self.release_lane(target);
        }
        outcome
    }

    /// Steps 2 and 3: snapshot, register, patch. No await in here.
    fn apply(
        &self,
        id: MutationId,
        kind: MutationKind,
        target_id: Option<NodeId>,
        parent_id: Option<NodeId>,
        patch: OptimisticPatch,
    ) {
        let listing = QueryKey::Files(parent_id);
        let before = self.cache.get(&listing);
        if before.is_some() {
            self.cache.cancel(&listing);
        }
        let snapshot = vec![(listing, before)];

        lock(&self.pending).push(PendingMutation {
            id,
            kind,
            target_id,
            parent_id,
            patch: patch.clone(),
            snapshot,
            status: MutationStatus::Applied,
            patched_version: 0,
        });

        let version = self
            .cache
            .write(&listing, |old| map_listing(old, |files| patch.apply(files)));
        self.with_pending(id, |m| m.patched_version = version);
        debug!(mutation = id, %kind, key = %listing, "optimistic patch applied");
    }

    async fn call(&self, request: MutationRequest) -> ClientResult<Option<FileNode>> {
        match request {
            MutationRequest::Upload { parent_id, file } => {
                self.api.upload(parent_id, file).await.map(Some)
            }
            MutationRequest::CreateFolder { parent_id, name } => {
                self.api.create_folder(parent_id, &name).await.map(Some)
            }
            MutationRequest::Rename { id, new_name, .. } => {
                self.api.rename(id, &new_name).await.map(Some)
            }
            MutationRequest::Delete { id, .. } => self.api.delete(id).await.map(|()| None),
        }
    }

    fn with_pending<F: FnOnce(&mut PendingMutation)>(&self, id: MutationId, f: F) {
        if let Some(m) = lock(&self.pending).iter_mut().find(|m| m.id == id) {
            f(m);
        }
    }

    fn set_status(&self, id: MutationId, status: MutationStatus) {
        self.with_pending(id, |m| m.status = status);
    }

    fn take_pending(&self, id: MutationId) -> Option<PendingMutation> {
        let mut pending = lock(&self.pending);
        let index = pending.iter().position(|m| m.id == id)?;
        Some(pending.remove(index))
    }

    fn commit(&self, id: MutationId, server_node: Option<&FileNode>) -> MutationStatus {
        let Some(mutation) = self.take_pending(id) else {
            warn!(mutation = id, "pending mutation missing from ledger");
            return MutationStatus::Discarded;
        };
        let listing = QueryKey::Files(mutation.parent_id);
        self.cache.cancel(&listing);

        let mut status = MutationStatus::Committed;
        match (&mutation.patch, server_node) {
            (OptimisticPatch::Insert(placeholder), Some(node)) => {
                let temp_id = placeholder.id;
                self.cache.write(&listing, |old| {
                    map_listing(old, |files| replace_placeholder(files, temp_id, node))
                });
            }
            (OptimisticPatch::Rename { id: target, .. }, node) => {
                let target = *target;
                if self.is_tombstoned(target) {
                    status = MutationStatus::Discarded;
                    self.cache.write(&listing, |old| {
                        map_listing(old, |files| {
                            files.iter().filter(|f| f.id != target).cloned().collect()
                        })
                    });
                } else if let Some(node) = node {
                    self.cache.write(&listing, |old| {
                        map_listing(old, |files| {
                            files
                                .iter()
                                .map(|f| if f.id == node.id { node.clone() } else { f.clone() })
                                .collect()
                        })
                    });
                }
            }
            (OptimisticPatch::Remove { id: target }, _) => {
                lock(&self.deleted).insert(*target, mutation.parent_id);
                self.cache.write(&listing, |old| {
                    map_listing(old, |files| mutation.patch.apply(files))
                });
            }
            (OptimisticPatch::Insert(_), None) => {}
        }

        if status == MutationStatus::Discarded {
            info!(
                mutation = id,
                kind = %mutation.kind,
                target = ?mutation.target_id,
                "target deleted meanwhile, result discarded"
            );
        } else {
            info!(
                mutation = id,
                kind = %mutation.kind,
                target = ?mutation.target_id,
                node = ?server_node.map(|n| n.id),
                "mutation committed"
            );
        }
        status
    }

    fn roll_back(&self, id: MutationId, error: &ClientError) {
        let Some(mutation) = self.take_pending(id) else {
            warn!(mutation = id, "pending mutation missing from ledger");
            return;
        };

        for (key, before) in &mutation.snapshot {
            self.cache.cancel(key);
            if self.cache.version(key) == Some(mutation.patched_version) {
                let before = before.clone();
                self.cache.write(key, |_| before);
            } else {
                // Someone else wrote after us: undo only our own change.
                let before_files = match before {
                    Some(QueryData::Files(files)) => files.as_slice(),
                    _ => &[][..],
                };
                self.cache.write(key, |old| {
                    map_listing(old, |files| mutation.patch.revert(files, before_files))
                });
            }
        }

        warn!(
            mutation = id,
            kind = %mutation.kind,
            target = ?mutation.target_id,
            error = %error,
            "mutation failed, optimistic patch rolled back"
        );
    }
}

/// Drop tombstones for ids a fresh listing of `parent` no longer contains,
/// unless another mutation of the id is still queued on its lane.
fn forget_confirmed_deletes(
    deleted: &Mutex<HashMap<NodeId, Option<NodeId>>>,
    lanes: &Mutex<HashMap<NodeId, Lane>>,
    parent: Option<NodeId>,
    files: &[FileNode],
) {
    let mut deleted = lock(deleted);
    if deleted.is_empty() {
        return;
    }
    let lanes = lock(lanes);
    deleted.retain(|id, listed_in| {
        let confirmed = *listed_in == parent
            && !lanes.contains_key(id)
            && files.iter().all(|f| f.id != *id);
        if confirmed {
            debug!(node = *id, "delete confirmed by listing, tombstone dropped");
        }
        !confirmed
    });
}

/// Swap the placeholder for the server's node, keeping its position.
fn replace_placeholder(files: &[FileNode], temp_id: NodeId, node: &FileNode) -> Vec<FileNode> {
    let mut out: Vec<FileNode> = files
        .iter()
        .filter(|f| f.id != temp_id && f.id != node.id)
        .cloned()
        .collect();
    let index = files
        .iter()
        .filter(|f| f.id != node.id)
        .position(|f| f.id == temp_id)
        .unwrap_or(out.len());
    out.insert(index.min(out.len()), node.clone());
    out
}

fn optimistic_patch(request: &MutationRequest) -> OptimisticPatch {
    match request {
        MutationRequest::Upload { parent_id, file } => OptimisticPatch::Insert(
            FileNode::placeholder(next_temp_id(), *parent_id, &file.name, file.size(), false),
        ),
        MutationRequest::CreateFolder { parent_id, name } => OptimisticPatch::Insert(
            FileNode::placeholder(next_temp_id(), *parent_id, name, 0, true),
        ),
        MutationRequest::Rename { id, new_name, .. } => OptimisticPatch::Rename {
            id: *id,
            name: new_name.clone(),
        },
        MutationRequest::Delete { id, .. } => OptimisticPatch::Remove { id: *id },
    }
}
