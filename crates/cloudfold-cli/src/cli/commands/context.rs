//! Shared plumbing for commands: store construction, node lookup, outcome reporting.

use anyhow::{anyhow, Context};
use cloudfold_client::{ClientConfig, FileNode, FileStore, MutationOutcome, MutationStatus, NodeId, SessionGuard};
use tracing::debug;

use crate::cli::args::GlobalArgs;
use crate::exit_codes::{FAILED, SUCCESS};

pub fn open_store(global: &GlobalArgs) -> anyhow::Result<FileStore> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &global.url {
        config = config.with_url(url.clone());
    }
    if let Some(token) = &global.token {
        config = config.with_token(token.clone());
    }
    debug!(url = %config.url, "opening file store");

    let session = SessionGuard::new(|| {
        eprintln!("Session expired. Sign in again and update CLOUDFOLD_TOKEN.");
    });
    FileStore::new(config, session).context("failed to create client")
}

/// Find a node by id: its breadcrumb chain names the parent, whose listing
/// holds the full record.
pub async fn resolve_node(store: &FileStore, id: NodeId) -> anyhow::Result<FileNode> {
    let chain = store
        .path(id)
        .await
        .with_context(|| format!("looking up {}", id))?;
    let parent = match chain.len() {
        0 => return Err(anyhow!("{} has no path on the server", id)),
        1 => None,
        n => Some(chain[n - 2].id),
    };

    store
        .files(parent)
        .await
        .with_context(|| format!("listing the parent of {}", id))?
        .into_iter()
        .find(|node| node.id == id)
        .ok_or_else(|| anyhow!("{} is not in its parent folder", id))
}

/// Print the outcome of a mutation and turn it into an exit code.
pub fn report(outcome: &MutationOutcome, done: &str) -> i32 {
    match outcome.status {
        MutationStatus::Committed => {
            println!("{}", done);
            SUCCESS
        }
        MutationStatus::Discarded => {
            println!("{} (superseded by a later change)", done);
            SUCCESS
        }
        _ => {
            let message = outcome
                .message()
                .unwrap_or_else(|| format!("{} did not complete", outcome.kind));
            eprintln!("{}", message);
            outcome.error.as_ref().map_or(FAILED, |e| e.exit_code())
        }
    }
}
