use std::{collections::HashMap, thread};

use crossbeam_channel::{unbounded, Receiver, Sender};
use itertools::Itertools;
use serde_json::Value;

use crate::{
    error::SyncError,
    github::{BlobLookup, GitHubClient},
    hash::{predict_hash, BlobSha},
    tree::{join_path, ChangeSet, TreeChange, TreeEntry},
    types::JSON_EXTENSION,
    wordpress::WordpressClient,
};

pub const DEFAULT_FAN_OUT: usize = 8;

/// One physical file of a media: a size variant or the original upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryVariant {
    /// Repository path
    pub path: String,
    pub wordpress_url: String,
}

/// Resolve binary files of changed media json into blob references
pub struct BinaryReconciler<'a> {
    github: &'a dyn GitHubClient,
    wordpress: &'a dyn WordpressClient,
    media_root: String,
    fan_out: usize,
}

impl<'a> BinaryReconciler<'a> {
    pub fn new(
        github: &'a dyn GitHubClient,
        wordpress: &'a dyn WordpressClient,
        media_root: String,
    ) -> Self {
        Self {
            github,
            wordpress,
            media_root,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// New change set where binaries of changed media point to their blob,
    /// without any remaining pending entry
    pub fn reconcile(&self, changes: ChangeSet) -> Result<ChangeSet, SyncError> {
        let variants = self.variants(&changes)?;
        if !variants.is_empty() {
            log::info!("Checking {} media items", changes.len());
        }
        let resolved = self.resolve(variants)?;

        let mut reconciled: ChangeSet = Vec::with_capacity(changes.len());
        let mut placed: Vec<&String> = vec![];
        for entry in changes.iter() {
            match resolved.get(&entry.path) {
                Some(sha) if entry.is_pending() => {
                    placed.push(&entry.path);
                    reconciled.push(TreeEntry::sha(entry.path.clone(), sha.clone()));
                }
                _ if entry.is_pending() => {}
                _ => reconciled.push(entry.clone()),
            }
        }
        for (path, sha) in resolved.iter().sorted() {
            if !placed.contains(&path) {
                reconciled.push(TreeEntry::sha(path.clone(), sha.clone()));
            }
        }

        Ok(reconciled)
    }

    /// Binary files referenced by changed media json, unique by path
    pub fn variants(&self, changes: &ChangeSet) -> Result<Vec<BinaryVariant>, SyncError> {
        let mut variants = vec![];

        for entry in changes {
            let content = match &entry.change {
                TreeChange::Content(content) if entry.path.ends_with(JSON_EXTENSION) => content,
                _ => continue,
            };
            let document: Value = serde_json::from_str(content)?;
            let data = &document["data"];

            if let Some(sizes) = data["sizes"].as_array() {
                for size in sizes {
                    variants.push(self.variant(&entry.path, size)?);
                }
            }
            variants.push(self.variant(&entry.path, data)?);
        }

        Ok(variants
            .into_iter()
            .unique_by(|variant| variant.path.clone())
            .collect())
    }

    fn variant(&self, json_path: &str, data: &Value) -> Result<BinaryVariant, SyncError> {
        match (data["path"].as_str(), data["wordpress_url"].as_str()) {
            (Some(path), Some(wordpress_url)) => Ok(BinaryVariant {
                path: join_path(&self.media_root, path),
                wordpress_url: wordpress_url.to_string(),
            }),
            _ => Err(SyncError::UpstreamData(format!(
                "Media json {} reference a binary without path or url",
                json_path
            ))),
        }
    }

    /// Download, then upload when missing, each variant. Run on at most
    /// `fan_out` threads and wait for all of them.
    fn resolve(&self, variants: Vec<BinaryVariant>) -> Result<HashMap<String, BlobSha>, SyncError> {
        if variants.is_empty() {
            return Ok(HashMap::new());
        }

        let workers = self.fan_out.min(variants.len());
        let (job_sender, job_receiver): (Sender<BinaryVariant>, Receiver<BinaryVariant>) =
            unbounded();
        let (result_sender, result_receiver): (
            Sender<Result<(String, BlobSha), SyncError>>,
            Receiver<Result<(String, BlobSha), SyncError>>,
        ) = unbounded();
        for variant in variants {
            job_sender
                .send(variant)
                .map_err(|error| SyncError::Programmatic(format!("Job channel : {}", error)))?;
        }
        drop(job_sender);

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_receiver = job_receiver.clone();
                let result_sender = result_sender.clone();
                scope.spawn(move || {
                    for variant in job_receiver.iter() {
                        let result = self.sync_binary(&variant).map(|sha| (variant.path, sha));
                        if result_sender.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_sender);

        let mut resolved = HashMap::new();
        let mut first_error = None;
        for result in result_receiver.iter() {
            match result {
                Ok((path, sha)) => {
                    resolved.insert(path, sha);
                }
                Err(error) => {
                    log::error!("Binary sync failed : {}", error);
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(resolved),
        }
    }

    fn sync_binary(&self, variant: &BinaryVariant) -> Result<BlobSha, SyncError> {
        let content = self.wordpress.download(&variant.wordpress_url)?;
        let sha = predict_hash(&content);

        match self.github.blob_exists(&sha)? {
            BlobLookup::Found => {
                log::debug!("Blob {} of {} already exists", sha, variant.path);
                Ok(sha)
            }
            BlobLookup::NotFound => {
                let created = self.github.create_blob(&content)?;
                if created != sha {
                    log::warn!(
                        "Predicted blob sha {} differ from created {} for {}",
                        sha,
                        created,
                        variant.path
                    );
                }
                Ok(created)
            }
        }
    }
}
