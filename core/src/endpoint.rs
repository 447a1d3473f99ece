use std::thread::{self, ScopedJoinHandle};

use crate::{
    cache::{CacheKey, EndpointKey, Fingerprint, SyncCache},
    chunk::DEFAULT_PAYLOAD_CEILING,
    config::{EndpointConfig, Project, RemoteConfigFile},
    desired::{
        api_request_states, general_file_url, remove_response_properties, ApiRequestData,
        BuildContext, MediaAsset, PAGES_FIELD_REFERENCE, POSTS_FIELD_REFERENCE,
    },
    diff::diff_remote,
    error::SyncError,
    github::{Committer, GitHubClient},
    hash::{predict_text_hash, BlobSha},
    media::{BinaryReconciler, DEFAULT_FAN_OUT},
    publish::{PublishMode, Publisher},
    report::{CommitReport, EndpointReport},
    rows::{parse_rows, ContentRow, MediaRow},
    tree::{pretty_json, ChangeSet},
    types::{ContentClass, HTML_EXTENSION},
    utils::ensure_starts_with,
    wordpress::{api_url, Dictionary, WordpressClient, WordpressClientError},
};

pub const COMMIT_TITLE_POSTS: &str = "Wordpress Posts Update";
pub const COMMIT_TITLE_PAGES: &str = "Wordpress Pages Update";
pub const COMMIT_TITLE_MEDIA: &str = "Wordpress Media Update";
pub const COMMIT_TITLE_API_REQUESTS: &str = "Wordpress API Requests Update";
pub const COMMIT_TITLE_GENERAL: &str = "Wordpress General File Update";

struct Dictionaries {
    categories: Dictionary,
    tags: Dictionary,
    users: Option<Dictionary>,
}

/// Mirror one Wordpress site into its target branch
pub struct EndpointSync<'a> {
    project: &'a Project,
    github: &'a dyn GitHubClient,
    wordpress: &'a dyn WordpressClient,
    committer: Committer,
    payload_ceiling: usize,
    fan_out: usize,
}

impl<'a> EndpointSync<'a> {
    pub fn new(
        project: &'a Project,
        github: &'a dyn GitHubClient,
        wordpress: &'a dyn WordpressClient,
        committer: Committer,
    ) -> Self {
        Self {
            project,
            github,
            wordpress,
            committer,
            payload_ceiling: DEFAULT_PAYLOAD_CEILING,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    pub fn with_payload_ceiling(mut self, payload_ceiling: usize) -> Self {
        self.payload_ceiling = payload_ceiling;
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn endpoint_key(&self) -> EndpointKey {
        let target = &self.project.github_target;
        EndpointKey {
            owner: target.owner.clone(),
            repo: target.repo.clone(),
            branch: target.branch.clone(),
            api_url: api_url(&self.project.wordpress_source.url),
        }
    }

    fn site_url(&self) -> &str {
        &self.project.wordpress_source.url
    }

    fn branch(&self) -> &str {
        &self.project.github_target.branch
    }

    /// Run one pass. `None` when the endpoint is disabled or nothing changed
    /// since the previous pass.
    pub fn run(&self, cache: &mut SyncCache) -> Result<Option<EndpointReport>, SyncError> {
        let (config, config_sha) = self.remote_config()?;
        if config.disabled {
            log::info!("Remote config is disabled.");
            return Ok(None);
        }

        let key = self.endpoint_key();
        let result = self
            .fetch_api_requests(&config)
            .and_then(|requests| {
                if self.changed_since_last_pass(cache, &config, &config_sha, &requests)? {
                    self.sync(&config, &requests).map(Some)
                } else {
                    log::info!("match cache for {}", key);
                    Ok(None)
                }
            });

        if result.is_err() {
            // Next pass must not be skipped because of fingerprints stored by this one
            cache.forget(&key);
        }
        result
    }

    /// Endpoint configuration stored in the target repository, and its content hash
    pub fn remote_config(&self) -> Result<(EndpointConfig, BlobSha), SyncError> {
        let path = &self.project.github_target.config_path;
        let document = self.github.json_file(self.branch(), path)?;
        let sha = predict_text_hash(&pretty_json(&document)?);
        let config = serde_json::from_value::<RemoteConfigFile>(document)
            .map_err(|error| SyncError::RemoteConfig(format!("{} : {}", path, error)))?;

        Ok((config.data, sha))
    }

    fn fetch_api_requests(
        &self,
        config: &EndpointConfig,
    ) -> Result<Vec<ApiRequestData>, SyncError> {
        let mut requests = vec![];

        for request in &config.api_requests {
            let url = ensure_starts_with(self.site_url(), &request.source);
            let mut data = self.wordpress.json(&url)?;
            remove_response_properties(&mut data, &request.exclude_properties);
            requests.push(ApiRequestData {
                destination: request.destination.clone(),
                data,
            });
        }

        Ok(requests)
    }

    /// Store current fingerprints and tell if any differ from previous pass ones
    pub(crate) fn changed_since_last_pass(
        &self,
        cache: &mut SyncCache,
        config: &EndpointConfig,
        config_sha: &BlobSha,
        requests: &[ApiRequestData],
    ) -> Result<bool, SyncError> {
        let key = self.endpoint_key();
        let mut changed = cache.update(
            CacheKey::new(&key, &ContentClass::RemoteConfig.to_string()),
            Fingerprint::ContentHash(config_sha.clone()),
        );

        let classes = [
            (ContentClass::Media, config.media_path.is_some()),
            (ContentClass::Posts, config.post_path.is_some()),
            (ContentClass::Pages, config.page_path.is_some()),
        ];
        for (class, enabled) in classes {
            if let (true, Some(object_type)) = (enabled, class.object_type()) {
                let status = self.wordpress.modified_status(object_type)?;
                changed |= cache.update(
                    CacheKey::new(&key, &class.to_string()),
                    Fingerprint::Modified(status),
                );
            }
        }

        for request in requests {
            let sha = predict_text_hash(&pretty_json(&request.data)?);
            changed |= cache.update(
                CacheKey::new(
                    &key,
                    &format!("{}:{}", ContentClass::ApiRequests, request.destination),
                ),
                Fingerprint::ContentHash(sha),
            );
        }

        Ok(changed)
    }

    fn ensure_push_permission(&self) -> Result<(), SyncError> {
        if !self.github.permissions()?.push {
            return Err(SyncError::NoPushPermission(
                self.project.github_target.repo.clone(),
            ));
        }
        Ok(())
    }

    fn dictionaries(&self, config: &EndpointConfig) -> Result<Dictionaries, SyncError> {
        thread::scope(|scope| {
            let categories = scope.spawn(|| self.wordpress.dictionary("categories"));
            let tags = scope.spawn(|| self.wordpress.dictionary("tags"));
            let users = scope.spawn(|| {
                if config.hide_author_name {
                    Ok(None)
                } else {
                    self.wordpress.dictionary("users").map(Some)
                }
            });

            Ok(Dictionaries {
                categories: joined(categories)?,
                tags: joined(tags)?,
                users: joined(users)?,
            })
        })
    }

    fn publisher(&self) -> Publisher<'_> {
        Publisher::new(
            self.github,
            self.branch().to_string(),
            self.committer.clone(),
            PublishMode::from(self.project.github_target.pull_request),
        )
        .with_payload_ceiling(self.payload_ceiling)
    }

    fn sync(
        &self,
        config: &EndpointConfig,
        requests: &[ApiRequestData],
    ) -> Result<EndpointReport, SyncError> {
        self.ensure_push_permission()?;

        let dictionaries = self.dictionaries(config)?;
        let context = BuildContext {
            site_url: self.site_url(),
            target: &self.project.github_target,
            config,
            tags_exclude: &self.project.wordpress_source.tags_exclude,
            users: dictionaries.users.as_ref(),
            categories: &dictionaries.categories,
            tags: &dictionaries.tags,
        };
        let publisher = self.publisher();
        let mut report = EndpointReport::new(self.project.name.clone());

        if let Some(general_file_path) = &config.general_file_path {
            report.push(self.sync_general(&context, &publisher, general_file_path)?);
        }

        let mut media_assets = None;
        if let Some(media_path) = &config.media_path {
            let (commit, assets) = self.sync_media(&context, &publisher, media_path)?;
            report.push(commit);
            media_assets = Some(assets);
        }

        if let Some(post_path) = &config.post_path {
            report.push(self.sync_content(
                &context,
                &publisher,
                ContentClass::Posts,
                post_path,
                media_assets.as_deref(),
            )?);
        }

        if let Some(page_path) = &config.page_path {
            report.push(self.sync_content(
                &context,
                &publisher,
                ContentClass::Pages,
                page_path,
                media_assets.as_deref(),
            )?);
        }

        for state in api_request_states(requests) {
            let changes = diff_remote(
                self.github,
                self.branch(),
                &state.files,
                &state.folder,
                false,
            )?;
            let title = api_requests_title(&state.folder, changes.len());
            report.push(publisher.publish(changes, &title)?);
        }

        Ok(report)
    }

    fn sync_general(
        &self,
        context: &BuildContext,
        publisher: &Publisher,
        general_file_path: &str,
    ) -> Result<Option<CommitReport>, SyncError> {
        let data = self.wordpress.json(&general_file_url(self.site_url()))?;
        let state = context.general_state(general_file_path, data);
        let changes = diff_remote(self.github, self.branch(), &state.files, &state.folder, false)?;
        publisher.publish(changes, COMMIT_TITLE_GENERAL)
    }

    fn sync_media(
        &self,
        context: &BuildContext,
        publisher: &Publisher,
        media_path: &str,
    ) -> Result<(Option<CommitReport>, Vec<MediaAsset>), SyncError> {
        let rows = parse_rows::<MediaRow>("media", self.wordpress.rows("media")?)?;
        let state = context.media_state(&rows)?;

        let changes = diff_remote(self.github, self.branch(), &state.files, media_path, true)?;
        let changes = BinaryReconciler::new(self.github, self.wordpress, media_path.to_string())
            .with_fan_out(self.fan_out)
            .reconcile(changes)?;

        let title = format!("{} ({} updates)", COMMIT_TITLE_MEDIA, changes.len());
        Ok((publisher.publish(changes, &title)?, state.assets))
    }

    fn sync_content(
        &self,
        context: &BuildContext,
        publisher: &Publisher,
        class: ContentClass,
        path: &str,
        media: Option<&[MediaAsset]>,
    ) -> Result<Option<CommitReport>, SyncError> {
        let (object_type, field_reference, title) = match class {
            ContentClass::Posts => ("posts", POSTS_FIELD_REFERENCE, COMMIT_TITLE_POSTS),
            ContentClass::Pages => ("pages", PAGES_FIELD_REFERENCE, COMMIT_TITLE_PAGES),
            _ => {
                return Err(SyncError::Programmatic(format!(
                    "{} is not a post or page class",
                    class
                )))
            }
        };

        let rows = parse_rows::<ContentRow>(object_type, self.wordpress.rows(object_type)?)?;
        let files = context.content_state(&rows, field_reference, media)?;
        let changes = diff_remote(self.github, self.branch(), &files, path, true)?;

        let title = format!("{} ({} updates)", title, html_count(&changes));
        publisher.publish(changes, &title)
    }
}

fn joined<T>(
    handle: ScopedJoinHandle<'_, Result<T, WordpressClientError>>,
) -> Result<T, SyncError> {
    handle
        .join()
        .map_err(|_| SyncError::Programmatic("Dictionary fetch thread panicked".to_string()))?
        .map_err(SyncError::from)
}

fn html_count(changes: &ChangeSet) -> usize {
    changes
        .iter()
        .filter(|entry| entry.path.ends_with(HTML_EXTENSION))
        .count()
}

/// "Wordpress API Requests Update (2 updates to menus)"
pub fn api_requests_title(folder: &str, count: usize) -> String {
    let label = match folder.rsplit('/').next() {
        Some(label) if !label.is_empty() => label,
        _ => "root",
    };
    let updates = if count == 1 { "update" } else { "updates" };
    format!(
        "{} ({} {} to {})",
        COMMIT_TITLE_API_REQUESTS, count, updates, label
    )
}
