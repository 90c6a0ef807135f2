//! Client for the cloudfold hierarchical file store.
//!
//! This crate keeps a local view of a remote folder tree consistent with the
//! server while the user browses and edits it:
//!
//! - Keyed query cache with stale-while-revalidate and garbage collection
//! - Optimistic mutations (upload, create folder, rename, delete) with
//!   reconcile on success and exact rollback on failure
//! - A static invalidation table so the listing and quota never stay stale
//! - Folder navigation with breadcrumbs and generation fencing
//!
//! # Quick Start
//!
//! ```no_run
//! use cloudfold_client::{delete_prompt, ClientConfig, FileStore, SessionGuard};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = FileStore::new(ClientConfig::from_env(), SessionGuard::detached())?;
//!
//! store.navigate_to(None).await;
//! for file in store.view().listing {
//!     println!("{} ({})", file.name, delete_prompt(&file).text(&file.name));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Session expiry
//!
//! A `401` from any request calls the handler given to [`SessionGuard::new`]
//! once. The crate never decides what to do about it.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CLOUDFOLD_URL` | API base URL (default: `http://localhost:8080/api`) |
//! | `CLOUDFOLD_TOKEN` | Bearer token |
//! | `CLOUDFOLD_TIMEOUT` | Request timeout in seconds (default: 10) |
//! | `CLOUDFOLD_UPLOAD_TIMEOUT` | Upload timeout in seconds (default: 30) |
//! | `CLOUDFOLD_MAX_RETRIES` | Retries for transient read failures (default: 2) |
//! | `CLOUDFOLD_STALE_SECS` | Seconds before cached data is stale (default: 300) |
//! | `CLOUDFOLD_GC_SECS` | Seconds unobserved data is kept (default: 600) |

pub mod auth;
pub mod boundary;
pub mod cache;
pub mod client;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod mutation;
pub mod navigation;
pub mod queries;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use auth::{SessionGuard, TokenProvider};
pub use boundary::{delete_prompt, human_bytes, row_actions, Capabilities, DeletePrompt, RowAction};
pub use cache::{CacheEntry, CacheOptions, EntryStatus, Fetcher, QueryCache, Subscription};
pub use client::{FileApi, HttpFileClient};
pub use error::{ClientError, ClientResult};
pub use invalidation::{patterns_for, Dependent, MutationKind, INVALIDATION_TABLE};
pub use keys::{KeyPattern, QueryData, QueryKey};
pub use mutation::{
    FileCache, MutationCoordinator, MutationId, MutationOutcome, MutationRequest, MutationStatus,
    OptimisticPatch, PendingMutation,
};
pub use navigation::{
    NavState, NavigationOutcome, NavigationRequest, NavigationStateMachine, NavigationView,
};
pub use queries::Queries;
pub use store::FileStore;
pub use types::{ClientConfig, Crumb, Download, FileNode, NodeId, Quota, UploadFile};
