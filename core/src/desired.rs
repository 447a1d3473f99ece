//! Transform fetched Wordpress rows into the files which must exist in the
//! repository. Nothing here performs network calls.

use serde_json::{json, Map, Value};

use crate::{
    config::{EndpointConfig, GitHubTarget},
    error::SyncError,
    rows::{ContentRow, MediaRow},
    tree::{split_parent, DesiredContent, DesiredStateMap},
    types::{HTML_EXTENSION, JSON_EXTENSION},
    utils::ensure_starts_with,
    wordpress::{api_url, Dictionary},
};

pub const UPLOADS_SEGMENT: &str = "/wp-content/uploads/";
pub const API_VERSION: &str = "v2";
pub const REFRESH_FREQUENCY: &str = "as needed";
pub const PROCESS_SOURCE_CODE: &str = concat!("wpsync ", env!("CARGO_PKG_VERSION"));
pub const GENERAL_FILE_FIELDS: &str =
    "description,gmt_offset,name,namespaces,timezone_string,home,url";

pub const POSTS_FIELD_REFERENCE: &str = "https://developer.wordpress.org/rest-api/reference/posts/";
pub const PAGES_FIELD_REFERENCE: &str = "https://developer.wordpress.org/rest-api/reference/pages/";
pub const MEDIA_FIELD_REFERENCE: &str = "https://developer.wordpress.org/rest-api/reference/media/";

/// Everything needed to turn rows of one endpoint into files
pub struct BuildContext<'a> {
    pub site_url: &'a str,
    pub target: &'a GitHubTarget,
    pub config: &'a EndpointConfig,
    pub tags_exclude: &'a [String],
    /// `None` when author names are hidden
    pub users: Option<&'a Dictionary>,
    pub categories: &'a Dictionary,
    pub tags: &'a Dictionary,
}

/// Media files plus what posts and pages need to reference them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaState {
    pub files: DesiredStateMap,
    pub assets: Vec<MediaAsset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: u64,
    /// Size objects as written in the media json (`type`, `path`, `wordpress_url`, ...)
    pub sizes: Vec<Map<String, Value>>,
}

/// One mirrored api response, fetched and filtered
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequestData {
    pub destination: String,
    pub data: Value,
}

/// Files of one repository folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderState {
    pub folder: String,
    pub files: DesiredStateMap,
}

impl<'a> BuildContext<'a> {
    fn common_meta(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("api_version".to_string(), json!(API_VERSION));
        meta.insert("api_url".to_string(), json!(api_url(self.site_url)));
        meta.insert(
            "process".to_string(),
            json!({
                "source_code": PROCESS_SOURCE_CODE,
                "source_data": self.site_url,
                "deployment_target": format!(
                    "https://github.com/{}/{}/tree/{}",
                    self.target.owner, self.target.repo, self.target.branch
                ),
            }),
        );
        meta.insert("refresh_frequency".to_string(), json!(REFRESH_FREQUENCY));
        meta
    }

    /// `{meta, data}` document of a row
    fn wrap_in_file_meta(
        &self,
        field_reference: &str,
        created_date: &Option<String>,
        updated_date: &Option<String>,
        object_url: Option<String>,
        data: Map<String, Value>,
    ) -> Value {
        let mut meta = self.common_meta();
        meta.insert("created_date".to_string(), json!(created_date));
        meta.insert("updated_date".to_string(), json!(updated_date));
        meta.insert("field_reference".to_string(), json!(field_reference));
        if let Some(object_url) = object_url {
            meta.insert("object_url".to_string(), json!(object_url));
        }

        json!({"meta": meta, "data": data})
    }

    /// Author name, or id when names are hidden. `None` for unknown users.
    fn author(&self, author: u64) -> Option<Value> {
        match self.users {
            Some(users) => users.get(&author).map(|name| json!(name)),
            None => Some(json!(author)),
        }
    }

    fn set_author(&self, data: &mut Map<String, Value>, author: u64) {
        match self.author(author) {
            Some(author) => data.insert("author".to_string(), author),
            None => data.remove("author"),
        };
    }

    fn remove_excluded_properties(&self, data: &mut Map<String, Value>) {
        remove_properties(data, &self.config.exclude_properties)
    }

    /// Media json and binary placeholders, keyed by path relative to the media folder
    pub fn media_state(&self, rows: &[MediaRow]) -> Result<MediaState, SyncError> {
        let mut state = MediaState::default();

        for row in rows {
            let mut data = to_object(row)?;
            self.set_author(&mut data, row.author);
            data.insert(
                "wordpress_url".to_string(),
                json!(ensure_starts_with(self.site_url, &row.source_url)),
            );
            self.remove_excluded_properties(&mut data);

            let mut sizes = vec![];
            for (name, size) in row.sizes()? {
                let path = path_from_media_source_url(&size.source_url).ok_or_else(|| {
                    SyncError::UpstreamData(format!(
                        "Media {} size '{}' is not an upload : '{}'",
                        row.id, name, size.source_url
                    ))
                })?;
                let mut size_data = to_object(&size)?;
                size_data.insert("type".to_string(), json!(name));
                size_data.insert("path".to_string(), json!(path));
                size_data.insert(
                    "wordpress_url".to_string(),
                    json!(ensure_starts_with(self.site_url, &size.source_url)),
                );
                sizes.push((size.width, size_data));
            }
            // Big first
            sizes.sort_by(|(a, _), (b, _)| b.cmp(a));
            let sizes: Vec<Map<String, Value>> = sizes.into_iter().map(|(_, s)| s).collect();

            for size in &sizes {
                if let Some(path) = size.get("path").and_then(|p| p.as_str()) {
                    state
                        .files
                        .insert(path.to_string(), DesiredContent::BinaryPlaceholder);
                }
            }
            if !sizes.is_empty() {
                data.insert(
                    "sizes".to_string(),
                    Value::Array(sizes.iter().cloned().map(Value::Object).collect()),
                );
                state.assets.push(MediaAsset {
                    id: row.id,
                    sizes: sizes.clone(),
                });
            }

            let path = path_from_media_source_url(&row.source_url).ok_or_else(|| {
                SyncError::UpstreamData(format!(
                    "Media {} is not an upload : '{}'",
                    row.id, row.source_url
                ))
            })?;
            data.insert("path".to_string(), json!(path));
            state
                .files
                .insert(path.clone(), DesiredContent::BinaryPlaceholder);
            state.files.insert(
                replace_extension(&path, JSON_EXTENSION),
                DesiredContent::Json(self.wrap_in_file_meta(
                    MEDIA_FIELD_REFERENCE,
                    &row.date_gmt,
                    &row.modified_gmt,
                    row.object_url(),
                    data,
                )),
            );
        }

        Ok(state)
    }

    /// `{slug}.json` and `{slug}.html` of each post or page. `media` is given
    /// when media are mirrored too.
    pub fn content_state(
        &self,
        rows: &[ContentRow],
        field_reference: &str,
        media: Option<&[MediaAsset]>,
    ) -> Result<DesiredStateMap, SyncError> {
        let mut files = DesiredStateMap::new();

        for row in rows {
            let html = cleanup_content(&row.content);
            let tag_names = row.tags.as_ref().map(|ids| lookup(ids, self.tags));
            let json_path = format!("{}{}", row.slug, JSON_EXTENSION);
            let html_path = format!("{}{}", row.slug, HTML_EXTENSION);

            if let Some(tag_names) = &tag_names {
                if tag_names.iter().any(|tag| self.tags_exclude.contains(tag)) {
                    log::debug!("Exclude '{}' by its tags", row.slug);
                    files.insert(json_path, DesiredContent::Tombstone);
                    files.insert(html_path, DesiredContent::Tombstone);
                    continue;
                }
            }

            let mut data = to_object(row)?;
            self.set_author(&mut data, row.author);
            data.insert("wordpress_url".to_string(), json!(row.link));
            if let Some(categories) = &row.categories {
                data.insert(
                    "categories".to_string(),
                    json!(lookup(categories, self.categories)),
                );
            }
            if let Some(tag_names) = tag_names {
                data.insert("tags".to_string(), json!(tag_names));
            }
            if let Some(media) = media {
                let section = media_section(media, row.featured_media, &html);
                if !section.is_empty() {
                    data.insert("media".to_string(), Value::Array(section));
                }
            }
            self.remove_excluded_properties(&mut data);

            files.insert(
                json_path,
                DesiredContent::Json(self.wrap_in_file_meta(
                    field_reference,
                    &row.date_gmt,
                    &row.modified_gmt,
                    row.object_url(),
                    data,
                )),
            );
            files.insert(html_path, DesiredContent::Text(html));
        }

        Ok(files)
    }

    /// Site description file. `data` is the site root api document.
    pub fn general_state(&self, general_file_path: &str, mut data: Value) -> FolderState {
        if let Some(fields) = data.as_object_mut() {
            fields.remove("_links");
        }

        let mut meta = self.common_meta();
        meta.insert(
            "field_reference".to_string(),
            json!(general_file_url(self.site_url)),
        );

        let (folder, file_name) = split_parent(general_file_path);
        let mut files = DesiredStateMap::new();
        files.insert(
            file_name,
            DesiredContent::Json(json!({"meta": meta, "data": data})),
        );
        FolderState { folder, files }
    }
}

/// Mirrored api responses grouped by destination folder, folders in order of
/// first appearance
pub fn api_request_states(requests: &[ApiRequestData]) -> Vec<FolderState> {
    let mut states: Vec<FolderState> = vec![];

    for request in requests {
        let (folder, file_name) = split_parent(&request.destination);
        let content = DesiredContent::Json(request.data.clone());
        match states.iter_mut().find(|state| state.folder == folder) {
            Some(state) => state.files.insert(file_name, content),
            None => {
                let mut files = DesiredStateMap::new();
                files.insert(file_name, content);
                states.push(FolderState { folder, files })
            }
        }
    }

    states
}

/// Sizes of `media` featured by, or used in the html of, a post or page
pub fn media_section(media: &[MediaAsset], featured_media: Option<u64>, html: &str) -> Vec<Value> {
    let mut section = vec![];

    for asset in media {
        let featured = featured_media == Some(asset.id);
        for size in &asset.sizes {
            let source_url_match = size
                .get("source_url")
                .and_then(|url| url.as_str())
                .map(|url| html.contains(url))
                .unwrap_or(false);

            if featured || source_url_match {
                let mut item = Map::new();
                item.insert("id".to_string(), json!(asset.id));
                item.extend(size.clone());
                item.insert("source_url_match".to_string(), json!(source_url_match));
                item.insert("featured".to_string(), json!(featured));
                section.push(Value::Object(item));
            }
        }
    }

    section
}

/// Collapse triple line feeds and remove the leading one
pub fn cleanup_content(html: &str) -> String {
    let html = html.replace("\n\n\n", "\n");
    match html.strip_prefix('\n') {
        Some(stripped) => stripped.to_string(),
        None => html,
    }
}

/// "https://site/wp-content/uploads/2020/07/image.jpg" => "2020/07/image.jpg"
pub fn path_from_media_source_url(source_url: &str) -> Option<String> {
    source_url
        .split_once(UPLOADS_SEGMENT)
        .map(|(_, path)| path.to_string())
}

pub fn general_file_url(site_url: &str) -> String {
    format!(
        "{}/wp-json?_fields={}",
        site_url.trim_end_matches('/'),
        GENERAL_FILE_FIELDS
    )
}

pub fn remove_properties(data: &mut Map<String, Value>, properties: &[String]) {
    for property in properties {
        data.remove(property);
    }
}

/// Remove `properties` of an api response, or of each of its items for lists
pub fn remove_response_properties(data: &mut Value, properties: &[String]) {
    match data {
        Value::Object(fields) => remove_properties(fields, properties),
        Value::Array(items) => {
            for item in items {
                if let Value::Object(fields) = item {
                    remove_properties(fields, properties)
                }
            }
        }
        _ => {}
    }
}

fn replace_extension(path: &str, extension: &str) -> String {
    let (parent, name) = split_parent(path);
    let stem = match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name.as_str(),
    };
    if parent.is_empty() {
        format!("{}{}", stem, extension)
    } else {
        format!("{}/{}{}", parent, stem, extension)
    }
}

fn lookup(ids: &[u64], dictionary: &Dictionary) -> Vec<String> {
    ids.iter()
        .filter_map(|id| {
            let name = dictionary.get(id);
            if name.is_none() {
                log::debug!("Unknown dictionary id {}", id);
            }
            name.cloned()
        })
        .collect()
}

fn to_object<T: serde::Serialize>(row: &T) -> Result<Map<String, Value>, SyncError> {
    match serde_json::to_value(row)? {
        Value::Object(fields) => Ok(fields),
        other => Err(SyncError::Programmatic(format!(
            "Row serialized as non object : {}",
            other
        ))),
    }
}
