use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use ini::Ini;
use serde_derive::{Deserialize, Serialize};

use crate::{github::Committer, utils::strbool};

pub const DEFAULT_ENDPOINTS_FILE: &str = "endpoints.json";
const CONFIG_FILE_NAME: &str = ".wpsync.conf";

/// Process level settings: credentials, where to find endpoints, run mode
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub github_token: String,
    pub committer: Committer,
    pub slack_token: Option<String>,
    pub debug_channel: Option<String>,
    pub endpoints_file: PathBuf,
    pub debug: bool,
    pub interval: Option<Duration>,
}

impl AppConfig {
    /// Load from `config_file_path` (or the default user config file when it
    /// exists), then apply environment variables overrides
    pub fn from_env(config_file_path: Option<PathBuf>) -> Result<Self> {
        let config_ini = match config_file_path {
            Some(path) => Ini::load_from_file(&path).context(format!(
                "Error when loading config file at '{}'",
                path.display()
            ))?,
            None => match default_config_file_path() {
                Some(path) if path.exists() => Ini::load_from_file(&path).context(format!(
                    "Error when loading config file at '{}'",
                    path.display()
                ))?,
                _ => Ini::new(),
            },
        };

        Self::from_ini(config_ini, |name| std::env::var(name).ok())
    }

    pub fn from_ini<F>(config_ini: Ini, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |section: &str, key: &str, env_name: &str| -> Option<String> {
            env(env_name)
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    config_ini
                        .get_from(Some(section), key)
                        .map(|v| v.to_string())
                })
        };

        let github_token = value("github", "token", "GITHUB_TOKEN")
            .context("Missing GitHub token (\"token\" of \"github\" section or GITHUB_TOKEN)")?;
        let committer = Committer {
            name: value("github", "name", "GITHUB_NAME")
                .context("Missing committer name (\"name\" of \"github\" section or GITHUB_NAME)")?,
            email: value("github", "email", "GITHUB_EMAIL").context(
                "Missing committer email (\"email\" of \"github\" section or GITHUB_EMAIL)",
            )?,
        };
        let slack_token = value("slack", "token", "SLACKBOT_TOKEN");
        let debug_channel = value("slack", "debug_channel", "WPSYNC_DEBUG_CHANNEL");
        let endpoints_file = PathBuf::from(
            value("server", "endpoints_file", "WPSYNC_ENDPOINTS_FILE")
                .unwrap_or(DEFAULT_ENDPOINTS_FILE.to_string()),
        );
        let debug = strbool(&value("server", "debug", "WPSYNC_DEBUG").unwrap_or("0".to_string()));
        let interval = match value("server", "interval", "WPSYNC_INTERVAL") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse::<u64>()
                    .context("Unable to read interval config from server section")?,
            )),
            None => None,
        };

        if slack_token.is_none() {
            log::warn!("No slack token configured, reports will only be logged");
        }

        Ok(Self {
            github_token,
            committer,
            slack_token,
            debug_channel,
            endpoints_file,
            debug,
            interval,
        })
    }
}

pub fn default_config_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectsFile {
    pub data: ProjectsData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectsData {
    pub projects: Vec<Project>,
}

impl ProjectsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .context(format!("Read endpoints file at '{}'", path.display()))?;
        serde_json::from_str(&raw).context(format!("Parse endpoints file '{}'", path.display()))
    }
}

/// One Wordpress site mirrored into one GitHub repository branch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "enabledLocal")]
    pub enabled_local: bool,
    #[serde(default, rename = "ReportingChannel_Slack")]
    pub reporting_channel_slack: Option<String>,
    #[serde(rename = "WordPressSource")]
    pub wordpress_source: WordpressSource,
    #[serde(rename = "GitHubTarget")]
    pub github_target: GitHubTarget,
}

impl Project {
    /// Enabled for the current run mode
    pub fn active(&self, debug: bool) -> bool {
        if debug {
            self.enabled_local
        } else {
            self.enabled
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WordpressSource {
    pub url: String,
    #[serde(default)]
    pub tags_exclude: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GitHubTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub config_path: String,
    /// Open a pull request instead of committing on `branch`
    #[serde(default)]
    pub pull_request: bool,
}

/// Json file stored in the target repository at `GitHubTarget::config_path`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteConfigFile {
    pub data: EndpointConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfig {
    #[serde(default, rename = "disabled")]
    pub disabled: bool,
    #[serde(default)]
    pub post_path: Option<String>,
    #[serde(default)]
    pub page_path: Option<String>,
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub general_file_path: Option<String>,
    #[serde(default)]
    pub exclude_properties: Vec<String>,
    #[serde(default)]
    pub hide_author_name: bool,
    #[serde(default)]
    pub api_requests: Vec<ApiRequest>,
}

/// Arbitrary Wordpress json mirrored as is into `destination`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ApiRequest {
    /// Relative to the site url, ex. "/wp-json/menus/v1/menus/header"
    pub source: String,
    /// Repository path of the json file
    pub destination: String,
    #[serde(default)]
    pub exclude_properties: Vec<String>,
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_from_ini() {
        // Given
        let config_ini = Ini::load_from_str(
            "[github]\ntoken=secret\nname=Sync Bot\nemail=bot@example.gov\n\
             [slack]\ntoken=xoxb\ndebug_channel=C01\n\
             [server]\nendpoints_file=/etc/wpsync/endpoints.json\ndebug=true\ninterval=300\n",
        )
        .unwrap();

        // When
        let config = AppConfig::from_ini(config_ini, no_env).unwrap();

        // Then
        assert_eq!(config.github_token, "secret");
        assert_eq!(
            config.committer,
            Committer {
                name: "Sync Bot".to_string(),
                email: "bot@example.gov".to_string()
            }
        );
        assert_eq!(config.slack_token, Some("xoxb".to_string()));
        assert_eq!(config.debug_channel, Some("C01".to_string()));
        assert_eq!(
            config.endpoints_file,
            PathBuf::from("/etc/wpsync/endpoints.json")
        );
        assert!(config.debug);
        assert_eq!(config.interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_env_overrides_ini() {
        // Given
        let config_ini = Ini::load_from_str("[github]\ntoken=file\nname=A\nemail=a@a\n").unwrap();
        let env: HashMap<&str, &str> = [("GITHUB_TOKEN", "env"), ("WPSYNC_DEBUG", "1")]
            .into_iter()
            .collect();

        // When
        let config =
            AppConfig::from_ini(config_ini, |name| env.get(name).map(|v| v.to_string())).unwrap();

        // Then
        assert_eq!(config.github_token, "env");
        assert!(config.debug);
        assert_eq!(config.slack_token, None);
        assert_eq!(config.interval, None);
        assert_eq!(config.endpoints_file, PathBuf::from(DEFAULT_ENDPOINTS_FILE));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let config_ini = Ini::load_from_str("[github]\nname=A\nemail=a@a\n").unwrap();
        assert!(AppConfig::from_ini(config_ini, no_env).is_err());
    }

    #[test]
    fn test_parse_projects_file() {
        let raw = r#"{
            "data": {
                "projects": [
                    {
                        "name": "news",
                        "enabled": true,
                        "enabledLocal": false,
                        "ReportingChannel_Slack": "C02",
                        "WordPressSource": {"url": "https://news.example.gov", "tags_exclude": ["staging"]},
                        "GitHubTarget": {"Owner": "cagov", "Repo": "news", "Branch": "main", "ConfigPath": "wordpress/config.json"}
                    }
                ]
            }
        }"#;

        let projects: ProjectsFile = serde_json::from_str(raw).unwrap();

        let project = &projects.data.projects[0];
        assert!(project.active(false));
        assert!(!project.active(true));
        assert_eq!(project.wordpress_source.tags_exclude, vec!["staging"]);
        assert_eq!(project.github_target.config_path, "wordpress/config.json");
        assert!(!project.github_target.pull_request);
    }

    #[test]
    fn test_parse_remote_config() {
        let raw = r#"{
            "meta": {"title": "sync config"},
            "data": {
                "disabled": false,
                "PostPath": "wordpress/posts",
                "MediaPath": "wordpress/media",
                "ExcludeProperties": ["_links", "content"],
                "HideAuthorName": true,
                "ApiRequests": [{"Source": "/wp-json/menus/v1/menus/header", "Destination": "wordpress/menus/header.json"}]
            }
        }"#;

        let config: RemoteConfigFile = serde_json::from_str(raw).unwrap();

        assert_eq!(config.data.post_path, Some("wordpress/posts".to_string()));
        assert_eq!(config.data.page_path, None);
        assert!(config.data.hide_author_name);
        assert_eq!(config.data.api_requests[0].destination, "wordpress/menus/header.json");
        assert!(config.data.api_requests[0].exclude_properties.is_empty());
    }
}
