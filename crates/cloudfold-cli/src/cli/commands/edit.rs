use anyhow::{anyhow, Context};
use cloudfold_client::{delete_prompt, FileStore, UploadFile};
use dialoguer::{theme::ColorfulTheme, Confirm};

use super::super::args::{MkdirArgs, RenameArgs, RmArgs, UploadArgs};
use super::context::{report, resolve_node};
use crate::exit_codes::CANCELLED;

pub async fn upload(store: &FileStore, args: UploadArgs) -> anyhow::Result<i32> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("cannot derive a name from {}", args.file.display()))?,
    };

    let outcome = store.upload(args.parent, UploadFile::new(name.clone(), bytes)).await;
    let done = match &outcome.node {
        Some(node) => format!("uploaded {} [{}]", node.name, node.id),
        None => format!("uploaded {}", name),
    };
    Ok(report(&outcome, &done))
}

pub async fn mkdir(store: &FileStore, args: MkdirArgs) -> anyhow::Result<i32> {
    let outcome = store.create_folder(args.parent, args.name).await;
    let done = match &outcome.node {
        Some(node) => format!("created {} [{}]", node.name, node.id),
        None => "created folder".to_string(),
    };
    Ok(report(&outcome, &done))
}

pub async fn rename(store: &FileStore, args: RenameArgs) -> anyhow::Result<i32> {
    let node = resolve_node(store, args.id).await?;
    let outcome = store.rename(&node, args.new_name).await;
    let done = match &outcome.node {
        Some(renamed) => format!("renamed {} to {}", node.name, renamed.name),
        None => format!("renamed {}", node.name),
    };
    Ok(report(&outcome, &done))
}

pub async fn rm(store: &FileStore, args: RmArgs) -> anyhow::Result<i32> {
    let node = resolve_node(store, args.id).await?;
    let prompt = delete_prompt(&node);

    let confirmed = args.yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt.text(&node.name))
            .default(false)
            .interact()
            .unwrap_or(false);
    if !confirmed {
        eprintln!("Cancelled.");
        return Ok(CANCELLED);
    }

    let outcome = store.delete(&node).await;
    let done = if prompt.frees_quota() {
        format!("deleted {}", node.name)
    } else {
        format!("removed record {}", node.name)
    };
    Ok(report(&outcome, &done))
}
