//! Current folder, breadcrumbs and out-of-order response fencing.
//!
//! Every navigation bumps a generation counter. Results of a navigation are
//! applied only while its generation is still the current one, so a slow
//! response for a folder the user already left never replaces the view.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::cache::Subscription;
use crate::error::{ClientError, ClientResult};
use crate::keys::{QueryData, QueryKey};
use crate::queries::Queries;
use crate::types::{Crumb, FileNode, NodeId};

/// Where the user is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavState {
    #[default]
    Root,
    Folder(NodeId),
}

impl NavState {
    pub fn from_target(target: Option<NodeId>) -> Self {
        target.map_or(Self::Root, Self::Folder)
    }

    /// Folder id, `None` for the root.
    pub fn folder_id(&self) -> Option<NodeId> {
        match self {
            Self::Root => None,
            Self::Folder(id) => Some(*id),
        }
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Folder(id) => write!(f, "folder {}", id),
        }
    }
}

/// A navigation in flight, tagged with its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationRequest {
    pub generation: u64,
    pub target: NavState,
}

/// What the user sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationView {
    pub location: NavState,
    /// Root to current folder, both ends included; empty at the root.
    pub breadcrumbs: Vec<Crumb>,
    pub listing: Vec<FileNode>,
    /// Error from the last fetch; the previous value stays visible.
    pub last_error: Option<ClientError>,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Applied(NavigationView),
    /// A later navigation started before this one finished.
    Superseded(NavigationRequest),
}

impl NavigationOutcome {
    pub fn view(&self) -> Option<&NavigationView> {
        match self {
            Self::Applied(view) => Some(view),
            Self::Superseded(_) => None,
        }
    }
}

#[derive(Default)]
struct NavInner {
    generation: u64,
    view: NavigationView,
    visible: Option<Subscription<QueryKey, QueryData>>,
}

/// Tracks the viewed folder for one session.
pub struct NavigationStateMachine {
    queries: Queries,
    inner: Mutex<NavInner>,
}

impl fmt::Debug for NavigationStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("NavigationStateMachine")
            .field("generation", &inner.generation)
            .field("location", &inner.view.location)
            .finish_non_exhaustive()
    }
}

impl NavigationStateMachine {
    pub fn new(queries: Queries) -> Self {
        Self {
            queries,
            inner: Mutex::new(NavInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NavInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn location(&self) -> NavState {
        self.lock().view.location
    }

    /// Current view, with the listing taken live from the cache.
    pub fn view(&self) -> NavigationView {
        let inner = self.lock();
        let mut view = inner.view.clone();
        if let Some(QueryData::Files(files)) = inner.visible.as_ref().and_then(|s| s.current()) {
            view.listing = files;
        }
        view
    }

    /// Open a folder (`Some(id)`) or the root (`None`).
    pub async fn navigate_to(&self, target: Option<NodeId>) -> NavigationOutcome {
        let request = self.begin(NavState::from_target(target));
        info!(generation = request.generation, target = %request.target, "navigating");

        let (crumbs, listing) = match request.target {
            NavState::Root => (Ok(Vec::new()), self.queries.files(None).await),
            // The chain is always refetched: an ancestor may have been renamed.
            NavState::Folder(id) => {
                tokio::join!(self.queries.fresh_path(id), self.queries.files(Some(id)))
            }
        };

        match self.apply(request, crumbs, listing) {
            Ok(view) => NavigationOutcome::Applied(view),
            Err(stale) => {
                debug!(error = %stale, "navigation superseded, results discarded");
                NavigationOutcome::Superseded(request)
            }
        }
    }

    fn begin(&self, target: NavState) -> NavigationRequest {
        let mut inner = self.lock();
        inner.generation += 1;
        let generation = inner.generation;

        if target == NavState::Root {
            inner.view.location = NavState::Root;
            inner.view.breadcrumbs.clear();
            inner.view.generation = generation;
            inner.visible = Some(self.queries.cache().subscribe(&QueryKey::Files(None)));
        }

        NavigationRequest { generation, target }
    }

    fn apply(
        &self,
        request: NavigationRequest,
        crumbs: ClientResult<Vec<Crumb>>,
        listing: ClientResult<Vec<FileNode>>,
    ) -> ClientResult<NavigationView> {
        let mut inner = self.lock();
        if inner.generation != request.generation {
            return Err(ClientError::StaleNavigation {
                generation: request.generation,
                current: inner.generation,
            });
        }

        let folder = request.target.folder_id();
        let cache = self.queries.cache();
        let mut last_error = None;

        let breadcrumbs = match (crumbs, request.target) {
            (Ok(crumbs), _) => crumbs,
            (Err(e), NavState::Folder(id)) => {
                last_error = Some(e);
                cache
                    .get(&QueryKey::Path(id))
                    .and_then(QueryData::into_path)
                    .unwrap_or_default()
            }
            (Err(e), NavState::Root) => {
                last_error = Some(e);
                Vec::new()
            }
        };
        let listing = match listing {
            Ok(files) => files,
            Err(e) => {
                last_error = Some(e);
                cache
                    .get(&QueryKey::Files(folder))
                    .and_then(QueryData::into_files)
                    .unwrap_or_default()
            }
        };

        if request.target != NavState::Root {
            inner.visible = Some(cache.subscribe(&QueryKey::Files(folder)));
        }
        inner.view = NavigationView {
            location: request.target,
            breadcrumbs,
            listing,
            last_error,
            generation: request.generation,
        };
        Ok(inner.view.clone())
    }

    /// Refetch the visible listing.
    pub fn refresh(&self) -> usize {
        let key = QueryKey::Files(self.location().folder_id());
        self.queries.cache().invalidate(|k| *k == key)
    }

    /// Stop observing the view. Navigations still in flight are fenced out.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.visible = None;
        debug!(generation = inner.generation, "navigation closed");
    }
}
