//! Human-readable output for CLI commands.

use crate::changelog::SnapshotCommitBundle;
use crate::commit::CommitOutcome;
use crate::snapshot::Snapshot;
use crate::tree::DirectoryTree;
use crate::types::{ChangeType, FileChange, Origin, Timestamp};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn colored_change(change: ChangeType) -> String {
    match change {
        ChangeType::Added => change.green().to_string(),
        ChangeType::Modified => change.yellow().to_string(),
        ChangeType::Deleted => change.red().to_string(),
    }
}

fn colored_origin(origin: Origin) -> String {
    match origin {
        Origin::Both => "conflict".red().bold().to_string(),
        other => other.to_string(),
    }
}

fn format_millis(millis: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Indented listing of a scanned tree.
pub fn format_tree_text(tree: &DirectoryTree) -> String {
    fn walk(node: &DirectoryTree, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        if node.is_dir() {
            out.push_str(&format!("{}{}/\n", indent, node.name.blue()));
            for child in node.children() {
                walk(child, depth + 1, out);
            }
        } else {
            out.push_str(&format!("{}{} ({} bytes)\n", indent, node.name, node.size));
        }
    }

    let mut out = String::new();
    walk(tree, 0, &mut out);
    out.push_str(&format!(
        "\n{} nodes, {} files\n",
        tree.node_count(),
        tree.files().len()
    ));
    out
}

pub fn format_changes_text(changes: &[FileChange]) -> String {
    if changes.is_empty() {
        return "No changes.\n".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Change", "Path", "User", "Origin", "Modified"]);
    for change in changes {
        table.add_row(vec![
            colored_change(change.change_type),
            change.relative_path.clone(),
            change.user.clone().unwrap_or_else(|| "-".to_string()),
            colored_origin(change.origin),
            change
                .modified_timestamp
                .map(format_millis)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    let conflicts = changes.iter().filter(|c| c.origin.is_conflict()).count();
    format!(
        "{}\n{} changes, {} conflicts.\n",
        table,
        changes.len(),
        conflicts
    )
}

/// Bundles newest first, one table per bundle.
pub fn format_log_text(bundles: &[SnapshotCommitBundle]) -> String {
    if bundles.is_empty() {
        return "No commits.\n".to_string();
    }
    let mut out = String::new();
    for bundle in bundles {
        let title = match &bundle.snapshot_path {
            None => "Live".to_string(),
            Some(path) => format!(
                "Snapshot {}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            ),
        };
        out.push_str(&format!("{}\n\n", format_section_heading(&title)));

        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Commit", "Author", "Date", "Message", "Files"]);
        for commit in &bundle.commits {
            let files = commit
                .files
                .iter()
                .map(|f| format!("{} {}", colored_change(f.action), f.path))
                .collect::<Vec<_>>()
                .join("\n");
            table.add_row(vec![
                short_id(&commit.id).to_string(),
                commit.author.clone(),
                commit.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
                commit.message.clone(),
                files,
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }
    out
}

pub fn format_snapshots_text(snapshots: &[Snapshot]) -> String {
    if snapshots.is_empty() {
        return "No snapshots.\n".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Snapshot", "Author", "Created"]);
    for snapshot in snapshots {
        table.add_row(vec![
            snapshot.id.clone(),
            snapshot.author.clone(),
            format_millis(snapshot.created),
        ]);
    }
    format!("{}\n", table)
}

pub fn format_commit_text(outcome: &CommitOutcome) -> String {
    let mut out = format!(
        "Committed {} ({} files) by {}\nPre-commit snapshot: {}\n",
        short_id(&outcome.commit.id),
        outcome.commit.files.len(),
        outcome.commit.author,
        outcome.snapshot.id
    );
    if !outcome.skipped_conflicts.is_empty() {
        out.push_str(&format!(
            "{} conflicting paths skipped (use --force to overwrite):\n",
            outcome.skipped_conflicts.len()
        ));
        for change in &outcome.skipped_conflicts {
            out.push_str(&format!("  {}\n", change.relative_path.red()));
        }
    }
    out
}
