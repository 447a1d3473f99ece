//! Typed Wordpress rows. Fields the sync relies on are explicit, everything
//! else is kept untouched in `other` so it can be mirrored.

use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;

/// A post or a page
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub id: u64,
    pub slug: String,
    #[serde(default)]
    pub author: u64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_gmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_gmt: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ContentRow {
    pub fn object_url(&self) -> Option<String> {
        self_link(&self.other)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaRow {
    pub id: u64,
    pub slug: String,
    #[serde(default)]
    pub author: u64,
    pub source_url: String,
    #[serde(default)]
    pub media_details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_gmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_gmt: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl MediaRow {
    pub fn object_url(&self) -> Option<String> {
        self_link(&self.other)
    }

    /// Resolution variants by size name. Empty for non image media (pdf, ...).
    pub fn sizes(&self) -> Result<Vec<(String, MediaSizeRow)>, SyncError> {
        let sizes = match self.media_details.get("sizes") {
            Some(Value::Object(sizes)) => sizes,
            _ => return Ok(vec![]),
        };

        sizes
            .iter()
            .map(|(name, size)| {
                serde_json::from_value::<MediaSizeRow>(size.clone())
                    .map(|size| (name.clone(), size))
                    .map_err(|error| {
                        SyncError::UpstreamData(format!(
                            "Media {} size '{}' : {}",
                            self.id, name, error
                        ))
                    })
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaSizeRow {
    pub source_url: String,
    #[serde(default)]
    pub width: u64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

pub fn parse_rows<T: DeserializeOwned>(
    object_type: &str,
    rows: Vec<Value>,
) -> Result<Vec<T>, SyncError> {
    rows.into_iter()
        .map(|row| {
            let id = row["id"].clone();
            serde_json::from_value::<T>(row).map_err(|error| {
                SyncError::UpstreamData(format!("{} row {} : {}", object_type, id, error))
            })
        })
        .collect()
}

fn self_link(fields: &Map<String, Value>) -> Option<String> {
    fields
        .get("_links")
        .and_then(|links| links["self"][0]["href"].as_str())
        .map(|href| href.to_string())
}
