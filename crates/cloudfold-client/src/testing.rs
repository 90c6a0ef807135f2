//! In-memory [`FileApi`] for unit tests.
//!
//! Calls can be held at a gate until the test releases them, failed once on
//! demand, and are counted per endpoint. Gates and counters use a generic
//! label (`"rename"`) and a targeted one (`"rename:3"`, `"list:root"`).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::client::FileApi;
use crate::error::{ClientError, ClientResult};
use crate::types::{Download, FileNode, NodeId, Quota, UploadFile};

pub(crate) fn node(id: NodeId, parent_id: Option<NodeId>, name: &str, size: u64) -> FileNode {
    FileNode {
        id,
        parent_id,
        name: name.to_string(),
        is_folder: false,
        size,
        lost: false,
        created_at: None,
        updated_at: None,
        is_optimistic: false,
    }
}

pub(crate) fn folder(id: NodeId, parent_id: Option<NodeId>, name: &str) -> FileNode {
    FileNode {
        is_folder: true,
        ..node(id, parent_id, name, 0)
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<NodeId, FileNode>,
    calls: HashMap<String, usize>,
    gates: HashMap<String, Arc<Semaphore>>,
    failures: HashMap<String, ClientError>,
    log: Vec<String>,
}

pub(crate) struct FakeApi {
    state: Mutex<State>,
    next_id: AtomicI64,
    lenient_renames: AtomicBool,
    total_space: u64,
}

fn not_found(id: NodeId) -> ClientError {
    ClientError::Validation {
        status: 404,
        message: format!("File not found: {}", id),
    }
}

impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            next_id: AtomicI64::new(100),
            lenient_renames: AtomicBool::new(false),
            total_space: 10 * 1024 * 1024 * 1024,
        })
    }

    /// Id the next created node receives.
    pub(crate) fn with_next_id(self: Arc<Self>, id: NodeId) -> Arc<Self> {
        self.next_id.store(id, Ordering::SeqCst);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn insert(&self, node: FileNode) {
        self.state().nodes.insert(node.id, node);
    }

    /// Rename succeeds even when the node no longer exists.
    pub(crate) fn lenient_renames(&self) {
        self.lenient_renames.store(true, Ordering::SeqCst);
    }

    /// Block calls matching `label` until released.
    pub(crate) fn hold(&self, label: &str) {
        self.state()
            .gates
            .insert(label.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let one held call matching `label` through.
    pub(crate) fn release(&self, label: &str) {
        if let Some(gate) = self.state().gates.get(label) {
            gate.add_permits(1);
        }
    }

    /// Remove the gate for `label`, letting held and later calls through.
    pub(crate) fn open(&self, label: &str) {
        if let Some(gate) = self.state().gates.remove(label) {
            gate.close();
        }
    }

    pub(crate) fn fail_next(&self, label: &str, error: ClientError) {
        self.state().failures.insert(label.to_string(), error);
    }

    pub(crate) fn calls(&self, label: &str) -> usize {
        self.state().calls.get(label).copied().unwrap_or(0)
    }

    /// Start/end events of mutation calls, in order.
    pub(crate) fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub(crate) async fn wait_for_call(&self, label: &str) {
        while self.calls(label) == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Count the call, wait at its gate, then take any injected failure.
    async fn enter(&self, endpoint: &str, target: &str, logged: bool) -> ClientResult<()> {
        let targeted = format!("{}:{}", endpoint, target);
        let gate = {
            let mut state = self.state();
            *state.calls.entry(endpoint.to_string()).or_default() += 1;
            *state.calls.entry(targeted.clone()).or_default() += 1;
            if logged {
                state.log.push(format!("{}:start", targeted));
            }
            state
                .gates
                .get(&targeted)
                .or_else(|| state.gates.get(endpoint))
                .cloned()
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.state();
        if logged {
            state.log.push(format!("{}:end", targeted));
        }
        let failure = state
            .failures
            .remove(&targeted)
            .or_else(|| state.failures.remove(endpoint));
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create(&self, parent_id: Option<NodeId>, name: &str, size: u64, is_folder: bool) -> FileNode {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = FileNode {
            is_folder,
            ..node(id, parent_id, name, size)
        };
        self.insert(created.clone());
        created
    }
}

fn target(id: Option<NodeId>) -> String {
    id.map_or_else(|| "root".to_string(), |id| id.to_string())
}

#[async_trait]
impl FileApi for FakeApi {
    /// Answers with the listing as it was when the request was sent, even
    /// when the response is held back.
    async fn list(&self, parent_id: Option<NodeId>) -> ClientResult<Vec<FileNode>> {
        let listing: Vec<FileNode> = self
            .state()
            .nodes
            .values()
            .filter(|n| n.parent_id == parent_id)
            .cloned()
            .collect();
        self.enter("list", &target(parent_id), false).await?;
        Ok(listing)
    }

    async fn ancestor_path(&self, id: NodeId) -> ClientResult<Vec<FileNode>> {
        self.enter("path", &id.to_string(), false).await?;
        let state = self.state();
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = state.nodes.get(&current).ok_or_else(|| not_found(current))?;
            chain.push(node.clone());
            cursor = node.parent_id;
        }
        chain.reverse();
        Ok(chain)
    }

    async fn quota(&self) -> ClientResult<Quota> {
        self.enter("quota", "all", false).await?;
        let used_space = self
            .state()
            .nodes
            .values()
            .filter(|n| !n.is_folder)
            .map(|n| n.size)
            .sum();
        Ok(Quota {
            used_space,
            total_space: self.total_space,
        })
    }

    async fn upload(&self, parent_id: Option<NodeId>, file: UploadFile) -> ClientResult<FileNode> {
        self.enter("upload", &target(parent_id), true).await?;
        Ok(self.create(parent_id, &file.name, file.size(), false))
    }

    async fn create_folder(&self, parent_id: Option<NodeId>, name: &str) -> ClientResult<FileNode> {
        self.enter("create_folder", &target(parent_id), true).await?;
        Ok(self.create(parent_id, name, 0, true))
    }

    async fn rename(&self, id: NodeId, new_name: &str) -> ClientResult<FileNode> {
        self.enter("rename", &id.to_string(), true).await?;
        let mut state = self.state();
        match state.nodes.get_mut(&id) {
            Some(existing) => {
                existing.name = new_name.to_string();
                Ok(existing.clone())
            }
            None if self.lenient_renames.load(Ordering::SeqCst) => Ok(node(id, None, new_name, 0)),
            None => Err(not_found(id)),
        }
    }

    async fn delete(&self, id: NodeId) -> ClientResult<()> {
        self.enter("delete", &id.to_string(), true).await?;
        let mut state = self.state();
        if state.nodes.remove(&id).is_none() {
            return Err(not_found(id));
        }
        let mut orphans: Vec<NodeId> = vec![id];
        while let Some(parent) = orphans.pop() {
            let children: Vec<NodeId> = state
                .nodes
                .values()
                .filter(|n| n.parent_id == Some(parent))
                .map(|n| n.id)
                .collect();
            for child in children {
                state.nodes.remove(&child);
                orphans.push(child);
            }
        }
        Ok(())
    }

    async fn download(&self, id: NodeId) -> ClientResult<Download> {
        self.enter("download", &id.to_string(), false).await?;
        let state = self.state();
        let node = state.nodes.get(&id).ok_or_else(|| not_found(id))?;
        Ok(Download {
            file_name: node.name.clone(),
            content_type: Some("application/octet-stream".into()),
            bytes: vec![0; node.size as usize],
        })
    }

    async fn download_zip(&self, id: NodeId) -> ClientResult<Download> {
        self.enter("zip", &id.to_string(), false).await?;
        let state = self.state();
        let node = state.nodes.get(&id).ok_or_else(|| not_found(id))?;
        Ok(Download {
            file_name: format!("{}.zip", node.name),
            content_type: Some("application/zip".into()),
            bytes: b"PK".to_vec(),
        })
    }

    async fn preview(&self, id: NodeId) -> ClientResult<Download> {
        self.enter("preview", &id.to_string(), false).await?;
        let state = self.state();
        let node = state.nodes.get(&id).ok_or_else(|| not_found(id))?;
        Ok(Download {
            file_name: node.name.clone(),
            content_type: Some("text/plain".into()),
            bytes: node.name.as_bytes().to_vec(),
        })
    }
}
