use std::path::{Path, PathBuf};

use anyhow::Context;
use cloudfold_client::{Download, FileStore};

use super::super::args::{DownloadArgs, ZipArgs};
use crate::exit_codes::SUCCESS;

pub async fn download(store: &FileStore, args: DownloadArgs) -> anyhow::Result<i32> {
    let payload = if args.preview {
        store.preview(args.id).await?
    } else {
        store.download(args.id).await?
    };
    save(&payload, args.output)
}

pub async fn zip(store: &FileStore, args: ZipArgs) -> anyhow::Result<i32> {
    let payload = store.download_folder_zip(args.id).await?;
    save(&payload, args.output)
}

fn save(payload: &Download, output: Option<PathBuf>) -> anyhow::Result<i32> {
    let target = output.unwrap_or_else(|| default_target(&payload.file_name));
    std::fs::write(&target, &payload.bytes)
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("saved {} ({} bytes)", target.display(), payload.bytes.len());
    Ok(SUCCESS)
}

/// Server-supplied names are reduced to their last component.
fn default_target(file_name: &str) -> PathBuf {
    Path::new(file_name)
        .file_name()
        .map_or_else(|| PathBuf::from("download"), PathBuf::from)
}
