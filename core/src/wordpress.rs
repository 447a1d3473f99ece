use std::{collections::HashMap, time::Duration};

use mockall::automock;
use reqwest::{
    blocking::{RequestBuilder, Response},
    Method,
};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const API_PATH: &str = "/wp-json/wp/v2/";
pub const DEFAULT_CLIENT_TIMEOUT: u64 = 60;
pub const PAGE_SIZE: usize = 100;
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
const TOTAL_HEADER: &str = "x-wp-total";

#[derive(Debug, Clone, Error)]
pub enum WordpressClientError {
    #[error("Connection error")]
    ConnectionError,
    #[error("Timeout error")]
    TimeoutError,
    #[error("Unexpected response status {0} for {1}")]
    UnexpectedStatus(u16, String),
    #[error("Invalid response: `{0}` (`{1}`)")]
    InvalidResponse(String, Value),
    #[error("Unknown error: `{0}`")]
    Unknown(String),
}

impl From<reqwest::Error> for WordpressClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            return Self::ConnectionError;
        }

        if error.is_timeout() {
            return Self::TimeoutError;
        }

        Self::Unknown(error.to_string())
    }
}

/// Most recent modification of an object type, as seen by the fingerprint query
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModifiedStatus {
    pub modified: Option<String>,
    pub count: u64,
}

pub type Dictionary = HashMap<u64, String>;

/// Read side of the Wordpress REST API. Object types and dictionaries are
/// path segments under the `wp/v2` api ("posts", "media", "tags", ...).
#[automock]
pub trait WordpressClient: Send + Sync {
    fn modified_status(&self, object_type: &str) -> Result<ModifiedStatus, WordpressClientError>;
    /// All rows of all pages, with `{"rendered": x}` fields replaced by `x`
    fn rows(&self, object_type: &str) -> Result<Vec<Value>, WordpressClientError>;
    fn dictionary(&self, list_name: &str) -> Result<Dictionary, WordpressClientError>;
    /// Json document at `url` (absolute)
    fn json(&self, url: &str) -> Result<Value, WordpressClientError>;
    fn download(&self, url: &str) -> Result<Vec<u8>, WordpressClientError>;
}

#[derive(Clone)]
pub struct Wordpress {
    site_url: String,
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl Wordpress {
    pub fn new(site_url: String) -> Result<Self, WordpressClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CLIENT_TIMEOUT))
            .build()?;
        Ok(Self {
            site_url,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_url(&self) -> String {
        api_url(&self.site_url)
    }

    fn get(&self, url: &str) -> Result<Response, WordpressClientError> {
        log::debug!("Wordpress GET {}", url);
        let build = || -> RequestBuilder { self.client.request(Method::GET, url) };
        let response = self.retry.send(build)?;

        if !response.status().is_success() {
            return Err(WordpressClientError::UnexpectedStatus(
                response.status().as_u16(),
                url.to_string(),
            ));
        }

        Ok(response)
    }

    /// Concatenated rows of every page of `query`
    fn paged(&self, query: &str) -> Result<Vec<Value>, WordpressClientError> {
        let mut rows = vec![];
        let mut total_pages = 1;
        let mut current_page = 1;

        while current_page <= total_pages {
            let url = format!("{}&page={}&cachebust={}", query, current_page, cache_bust());
            let response = self.get(&url)?;
            total_pages = header_number(&response, TOTAL_PAGES_HEADER).unwrap_or(1);

            match response.json::<Value>()? {
                Value::Array(page_rows) => rows.extend(page_rows),
                other => {
                    return Err(WordpressClientError::InvalidResponse(
                        format!("Page {} of {} is not a list", current_page, query),
                        other,
                    ))
                }
            }
            current_page += 1;
        }

        Ok(rows)
    }
}

impl WordpressClient for Wordpress {
    fn modified_status(&self, object_type: &str) -> Result<ModifiedStatus, WordpressClientError> {
        let url = format!(
            "{}{}?per_page=1&orderby=modified&order=desc&_fields=modified&cachebust={}",
            self.api_url(),
            object_type,
            cache_bust()
        );
        let response = self.get(&url)?;
        let count = header_number(&response, TOTAL_HEADER).unwrap_or(0);
        let rows = response.json::<Value>()?;

        let modified = rows
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| row["modified"].as_str())
            .map(|modified| modified.to_string());
        match modified {
            Some(modified) => Ok(ModifiedStatus {
                modified: Some(modified),
                count: count as u64,
            }),
            None => Ok(ModifiedStatus {
                modified: None,
                count: 0,
            }),
        }
    }

    fn rows(&self, object_type: &str) -> Result<Vec<Value>, WordpressClientError> {
        let query = format!(
            "{}{}?per_page={}&orderby=slug&order=asc",
            self.api_url(),
            object_type,
            PAGE_SIZE
        );
        log::info!("querying Wordpress API - {}", query);

        let mut rows = self.paged(&query)?;
        rows.iter_mut().for_each(flatten_rendered);
        Ok(rows)
    }

    fn dictionary(&self, list_name: &str) -> Result<Dictionary, WordpressClientError> {
        let query = format!(
            "{}{}?context=embed&hide_empty=true&per_page={}&_fields=id,name",
            self.api_url(),
            list_name,
            PAGE_SIZE
        );

        let mut dictionary = Dictionary::new();
        for row in self.paged(&query)? {
            match (row["id"].as_u64(), row["name"].as_str()) {
                (Some(id), Some(name)) => {
                    dictionary.insert(id, name.to_string());
                }
                _ => {
                    return Err(WordpressClientError::InvalidResponse(
                        format!("Unexpected {} row", list_name),
                        row,
                    ))
                }
            }
        }

        Ok(dictionary)
    }

    fn json(&self, url: &str) -> Result<Value, WordpressClientError> {
        Ok(self.get(url)?.json::<Value>()?)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, WordpressClientError> {
        log::info!("Downloading...{}", url);
        Ok(self.get(url)?.bytes()?.to_vec())
    }
}

pub fn api_url(site_url: &str) -> String {
    format!("{}{}", site_url.trim_end_matches('/'), API_PATH)
}

/// Replace every `{"rendered": x}` field of a row by `x`. Objects with a
/// null, false or zero `rendered` are kept as is.
pub fn flatten_rendered(row: &mut Value) {
    if let Some(fields) = row.as_object_mut() {
        for value in fields.values_mut() {
            let rendered = value
                .as_object()
                .and_then(|object| object.get("rendered"))
                .filter(|rendered| is_flattened(rendered))
                .cloned();
            if let Some(rendered) = rendered {
                *value = rendered;
            }
        }
    }
}

fn is_flattened(rendered: &Value) -> bool {
    match rendered {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(value) => value.as_f64().map_or(false, |value| value != 0.0),
        Value::String(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

fn header_number(response: &Response, name: &str) -> Option<usize> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<usize>().ok())
}

fn cache_bust() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{Reply, ScriptedServer};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_modified_status_after_transient_error() {
        // Given
        let server = ScriptedServer::start(vec![
            Reply::new(503, ""),
            Reply::new(200, r#"[{"modified": "2023-01-02T00:00:00"}]"#)
                .with_header("X-WP-Total", "12"),
        ]);
        let wordpress = Wordpress::new(server.address())
            .unwrap()
            .with_retry(RetryPolicy::new(1, Duration::ZERO));

        // When
        let status = wordpress.modified_status("posts").unwrap();

        // Then
        assert_eq!(
            status,
            ModifiedStatus {
                modified: Some("2023-01-02T00:00:00".to_string()),
                count: 12,
            }
        );
        let received = server.received();
        assert_eq!(received.len(), 2);
        assert!(received[1]
            .url
            .starts_with("/wp-json/wp/v2/posts?per_page=1&orderby=modified&order=desc"));
    }

    #[test]
    fn test_client_error_is_not_retried() {
        // Given
        let server = ScriptedServer::start(vec![Reply::new(401, "")]);
        let wordpress = Wordpress::new(server.address())
            .unwrap()
            .with_retry(RetryPolicy::new(3, Duration::ZERO));

        // When
        let result = wordpress.json(&format!("{}/wp-json/menus/v1/menus", server.address()));

        // Then
        assert!(matches!(
            result,
            Err(WordpressClientError::UnexpectedStatus(401, _))
        ));
        assert_eq!(server.received().len(), 1);
    }

    #[test]
    fn test_flatten_rendered() {
        // Given
        let mut row = json!({
            "id": 12,
            "title": {"rendered": "Hello"},
            "excerpt": {"rendered": "", "protected": false},
            "guid": {"raw": "x"},
            "meta": [],
            "template": {"rendered": false},
            "menu_order": {"rendered": 0},
            "parent": {"rendered": null},
        });

        // When
        flatten_rendered(&mut row);

        // Then
        assert_eq!(
            row,
            json!({
                "id": 12,
                "title": "Hello",
                "excerpt": "",
                "guid": {"raw": "x"},
                "meta": [],
                "template": {"rendered": false},
                "menu_order": {"rendered": 0},
                "parent": {"rendered": null},
            })
        );
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            api_url("https://news.example.gov/"),
            "https://news.example.gov/wp-json/wp/v2/"
        );
        assert_eq!(
            api_url("https://news.example.gov"),
            "https://news.example.gov/wp-json/wp/v2/"
        );
    }
}
