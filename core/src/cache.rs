use std::{collections::HashMap, fmt::Display};

use crate::{hash::BlobSha, wordpress::ModifiedStatus};

/// Identify one mirrored endpoint: a Wordpress api and a target branch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
}

impl Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!(
            "Owner:{},Repo:{},Branch:{},wordPressApiUrl:{}",
            self.owner, self.repo, self.branch, self.api_url
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub endpoint: EndpointKey,
    /// Content class, or mirrored api destination
    pub item: String,
}

impl CacheKey {
    pub fn new(endpoint: &EndpointKey, item: &str) -> Self {
        Self {
            endpoint: endpoint.clone(),
            item: item.to_string(),
        }
    }
}

/// Cheap to obtain representation of a remote state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Modified(ModifiedStatus),
    ContentHash(BlobSha),
}

/// Last seen fingerprints. Owned by the caller and kept between passes so
/// unchanged endpoints can be skipped.
#[derive(Debug, Default)]
pub struct SyncCache {
    entries: HashMap<CacheKey, Fingerprint>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&Fingerprint> {
        self.entries.get(key)
    }

    /// Store `fingerprint` and return true when it differs from the previous one
    /// (or when there was none)
    pub fn update(&mut self, key: CacheKey, fingerprint: Fingerprint) -> bool {
        match self.entries.insert(key, fingerprint.clone()) {
            Some(previous) => previous != fingerprint,
            None => true,
        }
    }

    /// Drop every fingerprint of `endpoint`, so its next pass is a full one
    pub fn forget(&mut self, endpoint: &EndpointKey) {
        self.entries.retain(|key, _| &key.endpoint != endpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
