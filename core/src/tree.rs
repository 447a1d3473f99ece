use std::collections::HashMap;

use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::hash::BlobSha;

pub const BLOB_MODE: &str = "100644";
pub const BLOB_TYPE: &str = "blob";

/// What a tree entry will do to its path when the tree is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    /// Create or replace with this text, remote computes the sha
    Content(String),
    /// Point to an existing blob
    Sha(BlobSha),
    /// Remove the path from the tree
    Delete,
    /// Binary file kept until its blob sha is known, never sent to remote
    PendingBinary,
}

/// A regular file node of a tree change set. Path is relative to repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub change: TreeChange,
}

impl TreeEntry {
    pub fn new(path: String, change: TreeChange) -> Self {
        Self { path, change }
    }

    pub fn content(path: String, content: String) -> Self {
        Self::new(path, TreeChange::Content(content))
    }

    pub fn sha(path: String, sha: BlobSha) -> Self {
        Self::new(path, TreeChange::Sha(sha))
    }

    pub fn delete(path: String) -> Self {
        Self::new(path, TreeChange::Delete)
    }

    pub fn pending(path: String) -> Self {
        Self::new(path, TreeChange::PendingBinary)
    }

    pub fn is_pending(&self) -> bool {
        self.change == TreeChange::PendingBinary
    }
}

// Matches the github "create a tree" row format
impl Serialize for TreeEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut row = serializer.serialize_struct("TreeEntry", 4)?;
        row.serialize_field("path", &self.path)?;
        row.serialize_field("mode", BLOB_MODE)?;
        row.serialize_field("type", BLOB_TYPE)?;
        match &self.change {
            TreeChange::Content(content) => row.serialize_field("content", content)?,
            TreeChange::Sha(sha) => row.serialize_field("sha", &sha.0)?,
            TreeChange::Delete => row.serialize_field("sha", &Option::<String>::None)?,
            TreeChange::PendingBinary => {
                return Err(S::Error::custom(format!(
                    "Binary file {} is still pending",
                    self.path
                )))
            }
        }
        row.end()
    }
}

pub type ChangeSet = Vec<TreeEntry>;

/// Blob file found on remote, path relative to the synchronized root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTreeEntry {
    pub path: String,
    pub sha: BlobSha,
}

impl RemoteTreeEntry {
    pub fn new(path: &str, sha: &str) -> Self {
        Self {
            path: path.to_string(),
            sha: BlobSha(sha.to_string()),
        }
    }
}

pub type RemoteTreeSnapshot = Vec<RemoteTreeEntry>;

#[derive(Debug, Clone, PartialEq)]
pub enum DesiredContent {
    Text(String),
    Json(Value),
    /// Binary file which must be kept, its blob is resolved later
    BinaryPlaceholder,
    /// Path must not exist after sync
    Tombstone,
}

impl DesiredContent {
    /// Canonical text form, `None` for placeholders and tombstones
    pub fn serialized(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            DesiredContent::Text(text) => Ok(Some(text.clone())),
            DesiredContent::Json(value) => Ok(Some(pretty_json(value)?)),
            DesiredContent::BinaryPlaceholder | DesiredContent::Tombstone => Ok(None),
        }
    }
}

/// Two spaces indented json. Object keys are sorted so the same data always
/// give the same text.
pub fn pretty_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Insertion ordered map of relative path to desired content. Inserting an
/// already known path replace its content at its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredStateMap {
    entries: Vec<(String, DesiredContent)>,
    index: HashMap<String, usize>,
}

impl DesiredStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, content: DesiredContent) {
        match self.index.get(&path) {
            Some(position) => self.entries[*position].1 = content,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, content));
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&DesiredContent> {
        self.index.get(path).map(|position| &self.entries[*position].1)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DesiredContent)> {
        self.entries.iter().map(|(path, content)| (path, content))
    }
}

impl FromIterator<(String, DesiredContent)> for DesiredStateMap {
    fn from_iter<T: IntoIterator<Item = (String, DesiredContent)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (path, content) in iter {
            map.insert(path, content);
        }
        map
    }
}

/// Prefix a relative path with the synchronized root (which can be empty)
pub fn join_path(root: &str, relative: &str) -> String {
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), relative)
    }
}

/// Split "a/b/c.json" into ("a/b", "c.json")
pub fn split_parent(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => ("".to_string(), path.to_string()),
    }
}
