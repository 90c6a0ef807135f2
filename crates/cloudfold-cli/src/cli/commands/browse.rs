use cloudfold_client::{human_bytes, row_actions, Capabilities, FileNode, FileStore};

use super::super::args::{LsArgs, PathArgs};
use crate::exit_codes::SUCCESS;

pub async fn ls(store: &FileStore, args: LsArgs) -> anyhow::Result<i32> {
    let outcome = store.navigate_to(args.folder).await;
    let view = outcome
        .view()
        .cloned()
        .unwrap_or_else(|| store.view());
    if let Some(err) = &view.last_error {
        return Err(err.clone().into());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view.listing)?);
        return Ok(SUCCESS);
    }

    if !view.breadcrumbs.is_empty() {
        let trail: Vec<&str> = view.breadcrumbs.iter().map(|c| c.name.as_str()).collect();
        println!("/{}", trail.join("/"));
    }
    for node in &view.listing {
        println!("{}", format_row(node));
    }
    Ok(SUCCESS)
}

pub async fn path(store: &FileStore, args: PathArgs) -> anyhow::Result<i32> {
    let crumbs = store.path(args.folder).await?;
    println!("/");
    for (depth, crumb) in crumbs.iter().enumerate() {
        println!("{}{} [{}]", "  ".repeat(depth + 1), crumb.name, crumb.id);
    }
    Ok(SUCCESS)
}

pub async fn quota(store: &FileStore) -> anyhow::Result<i32> {
    let quota = store.quota().await?;
    println!(
        "{} of {} used ({:.1}%)",
        human_bytes(quota.used_space),
        human_bytes(quota.total_space),
        quota.used_percent()
    );
    Ok(SUCCESS)
}

fn format_row(node: &FileNode) -> String {
    let kind = if node.is_folder { "dir " } else { "file" };
    let size = if node.is_folder {
        "-".to_string()
    } else {
        human_bytes(node.size)
    };
    let lost = if !node.is_folder && node.is_lost() {
        "  (lost)"
    } else {
        ""
    };
    let actions: Vec<String> = row_actions(node, Capabilities::full())
        .iter()
        .map(ToString::to_string)
        .collect();
    format!(
        "{:>8}  {}  {:>10}  {}{}  [{}]",
        node.id,
        kind,
        size,
        node.name,
        lost,
        actions.join(", ")
    )
}
