use std::collections::{HashMap, HashSet};

use crate::{
    error::SyncError,
    github::GitHubClient,
    hash::{predict_text_hash, BlobSha},
    tree::{join_path, ChangeSet, DesiredContent, DesiredStateMap, RemoteTreeSnapshot, TreeEntry},
};

/// Entries needed to turn `snapshot` (the files under `root`) into `desired`.
/// With `prune`, existing files which are not desired are deleted.
pub fn diff(
    desired: &DesiredStateMap,
    snapshot: &RemoteTreeSnapshot,
    root: &str,
    prune: bool,
) -> Result<ChangeSet, SyncError> {
    let existing: HashMap<&str, &BlobSha> = snapshot
        .iter()
        .map(|entry| (entry.path.as_str(), &entry.sha))
        .collect();
    let mut found: HashSet<&str> = HashSet::new();
    let mut changes = ChangeSet::new();

    for (path, content) in desired.iter() {
        let existing_sha = existing.get(path.as_str());
        match content {
            DesiredContent::Tombstone => {
                if !prune && existing_sha.is_some() {
                    changes.push(TreeEntry::delete(join_path(root, path)));
                }
            }
            DesiredContent::BinaryPlaceholder => {
                found.insert(path.as_str());
                changes.push(TreeEntry::pending(join_path(root, path)));
            }
            DesiredContent::Text(_) | DesiredContent::Json(_) => {
                found.insert(path.as_str());
                let serialized = content.serialized()?.ok_or_else(|| {
                    SyncError::Programmatic(format!("No serialized content for {}", path))
                })?;
                let predicted = predict_text_hash(&serialized);
                if existing_sha.copied() != Some(&predicted) {
                    changes.push(TreeEntry::content(join_path(root, path), serialized));
                }
            }
        }
    }

    if prune {
        for entry in snapshot {
            if !found.contains(entry.path.as_str()) {
                changes.push(TreeEntry::delete(join_path(root, &entry.path)));
            }
        }
    }

    Ok(changes)
}

/// Read the remote files under `root` at `branch` tip, then diff
pub fn diff_remote(
    client: &dyn GitHubClient,
    branch: &str,
    desired: &DesiredStateMap,
    root: &str,
    prune: bool,
) -> Result<ChangeSet, SyncError> {
    let snapshot = client.read_tree(branch, root)?;
    log::debug!(
        "Diff {} desired files against {} remote files in '{}'",
        desired.len(),
        snapshot.len(),
        root
    );
    diff(desired, &snapshot, root, prune)
}
