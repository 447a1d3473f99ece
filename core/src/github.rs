use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use mockall::automock;
use reqwest::{
    blocking::{RequestBuilder, Response},
    header, Method,
};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    hash::BlobSha,
    retry::RetryPolicy,
    tree::{split_parent, RemoteTreeEntry, RemoteTreeSnapshot, TreeEntry, BLOB_TYPE},
};

pub const DEFAULT_GITHUB_API_ADDRESS: &str = "https://api.github.com";
pub const DEFAULT_CLIENT_TIMEOUT: u64 = 60;
const USER_AGENT: &str = "wpsync";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

#[derive(Debug, Clone, Error)]
pub enum GitHubClientError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Connection error")]
    ConnectionError,
    #[error("Timeout error")]
    TimeoutError,
    #[error("Unexpected response status {0} : '{1}'")]
    UnexpectedStatus(u16, String),
    #[error("Invalid response: `{0}` (`{1}`)")]
    InvalidResponse(String, Value),
    #[error("Preparation error: `{0}`")]
    PrepareError(String),
    #[error("Unknown error: `{0}`")]
    Unknown(String),
}

impl From<reqwest::Error> for GitHubClientError {
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

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub html_url: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompareFile {
    pub filename: String,
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub ref_: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub html_url: String,
    pub number: u64,
    pub head: PullRequestHead,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobLookup {
    Found,
    NotFound,
}

/// Git data primitives of one repository
#[automock]
pub trait GitHubClient: Send + Sync {
    fn permissions(&self) -> Result<RepositoryPermissions, GitHubClientError>;
    /// Parsed content of a json file at given branch
    fn json_file(&self, branch: &str, path: &str) -> Result<Value, GitHubClientError>;
    /// Recursive listing of blobs under `root` (empty when `root` does not exist).
    /// Returned paths are relative to `root`.
    fn read_tree(&self, branch: &str, root: &str)
        -> Result<RemoteTreeSnapshot, GitHubClientError>;
    fn blob_exists(&self, sha: &BlobSha) -> Result<BlobLookup, GitHubClientError>;
    fn create_blob(&self, content: &[u8]) -> Result<BlobSha, GitHubClientError>;
    /// Return the sha of the created tree
    fn create_tree(
        &self,
        entries: &[TreeEntry],
        base_tree: &str,
    ) -> Result<String, GitHubClientError>;
    /// Sha of the commit the branch points to
    fn branch_head(&self, branch: &str) -> Result<String, GitHubClientError>;
    fn create_commit(
        &self,
        tree: &str,
        parent: &str,
        message: &str,
        committer: &Committer,
    ) -> Result<GitCommit, GitHubClientError>;
    fn compare(&self, base: &str, head: &str) -> Result<Vec<CompareFile>, GitHubClientError>;
    fn update_branch(&self, branch: &str, sha: &str) -> Result<(), GitHubClientError>;
    fn create_branch(&self, branch: &str, sha: &str) -> Result<(), GitHubClientError>;
    fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubClientError>;
}

#[derive(Deserialize, Debug)]
struct ContentsRow {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Deserialize, Debug)]
struct GitTreeRow {
    path: String,
    #[serde(rename = "type")]
    type_: String,
    sha: String,
}

#[derive(Deserialize, Debug)]
struct GitTree {
    tree: Vec<GitTreeRow>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize, Debug)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize, Debug)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize, Debug)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize, Debug)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize, Debug)]
struct RepositoryResponse {
    #[serde(default)]
    permissions: RepositoryPermissions,
}

#[derive(Clone)]
pub struct GitHub {
    api_address: String,
    owner: String,
    repo: String,
    token: String,
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl GitHub {
    pub fn new(owner: String, repo: String, token: String) -> Result<Self, GitHubClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CLIENT_TIMEOUT))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            api_address: DEFAULT_GITHUB_API_ADDRESS.to_string(),
            owner,
            repo,
            token,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_api_address(mut self, api_address: String) -> Self {
        self.api_address = api_address;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_address.trim_end_matches('/'),
            self.owner,
            self.repo,
            suffix
        )
        .trim_end_matches('/')
        .to_string()
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request_accepting(method, url, JSON_MEDIA_TYPE)
    }

    fn request_accepting(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(header::ACCEPT, accept)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, GitHubClientError> {
        log::debug!("GitHub {} {}", method, url);
        Ok(self.retry.send(|| {
            let request = self.request(method.clone(), url);
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })?)
    }

    fn response_error(&self, url: &str, response: Response) -> GitHubClientError {
        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|value| value["message"].as_str().map(|m| m.to_string()))
            .unwrap_or(text);

        match status {
            401 | 403 => GitHubClientError::PermissionDenied(message),
            404 => GitHubClientError::NotFound(url.to_string()),
            _ => GitHubClientError::UnexpectedStatus(status, message),
        }
    }

    fn json_response<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Response,
    ) -> Result<T, GitHubClientError> {
        if !response.status().is_success() {
            return Err(self.response_error(url, response));
        }

        let value = response.json::<Value>()?;
        serde_json::from_value::<T>(value.clone()).map_err(|error| {
            GitHubClientError::InvalidResponse(
                format!("Unexpected response format for {} : {}", url, error),
                value,
            )
        })
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, GitHubClientError> {
        let response = self.send(Method::GET, url, None)?;
        self.json_response(url, response)
    }

    fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, GitHubClientError> {
        let response = self.send(Method::POST, url, Some(body))?;
        self.json_response(url, response)
    }

    fn directory_sha(&self, branch: &str, root: &str) -> Result<Option<String>, GitHubClientError> {
        let (parent, _) = split_parent(root);
        let url = format!("{}?ref={}", self.repo_url(&format!("contents/{}", parent)), branch);
        let listing = match self.get::<Vec<ContentsRow>>(&url) {
            Ok(listing) => listing,
            Err(GitHubClientError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };

        Ok(listing
            .into_iter()
            .find(|row| row.path == root && row.type_ == "dir")
            .map(|row| row.sha))
    }
}

impl GitHubClient for GitHub {
    fn permissions(&self) -> Result<RepositoryPermissions, GitHubClientError> {
        let url = self.repo_url("");
        Ok(self.get::<RepositoryResponse>(&url)?.permissions)
    }

    fn json_file(&self, branch: &str, path: &str) -> Result<Value, GitHubClientError> {
        let url = format!("{}?ref={}", self.repo_url(&format!("contents/{}", path)), branch);
        let response = self
            .retry
            .send(|| self.request_accepting(Method::GET, &url, RAW_MEDIA_TYPE))?;
        self.json_response(&url, response)
    }

    fn read_tree(
        &self,
        branch: &str,
        root: &str,
    ) -> Result<RemoteTreeSnapshot, GitHubClientError> {
        let tree_ref = if root.is_empty() {
            branch.to_string()
        } else {
            match self.directory_sha(branch, root)? {
                Some(sha) => sha,
                None => {
                    log::debug!("No {} folder on branch {} yet", root, branch);
                    return Ok(vec![]);
                }
            }
        };

        let url = format!(
            "{}?recursive=true",
            self.repo_url(&format!("git/trees/{}", tree_ref))
        );
        let tree = self.get::<GitTree>(&url)?;
        if tree.truncated {
            log::warn!("Tree listing of '{}' is truncated by GitHub", root);
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|row| row.type_ == BLOB_TYPE)
            .map(|row| RemoteTreeEntry {
                path: row.path,
                sha: BlobSha(row.sha),
            })
            .collect())
    }

    fn blob_exists(&self, sha: &BlobSha) -> Result<BlobLookup, GitHubClientError> {
        let url = self.repo_url(&format!("git/blobs/{}", sha));
        let response = self.send(Method::HEAD, &url, None)?;

        match response.status().as_u16() {
            200 => Ok(BlobLookup::Found),
            404 => Ok(BlobLookup::NotFound),
            _ => Err(self.response_error(&url, response)),
        }
    }

    fn create_blob(&self, content: &[u8]) -> Result<BlobSha, GitHubClientError> {
        let url = self.repo_url("git/blobs");
        let body = json!({
            "content": STANDARD.encode(content),
            "encoding": "base64",
        });
        Ok(BlobSha(self.post::<ShaResponse>(&url, &body)?.sha))
    }

    fn create_tree(
        &self,
        entries: &[TreeEntry],
        base_tree: &str,
    ) -> Result<String, GitHubClientError> {
        let url = self.repo_url("git/trees");
        let tree = serde_json::to_value(entries)
            .map_err(|error| GitHubClientError::PrepareError(error.to_string()))?;
        let body = json!({
            "tree": tree,
            "base_tree": base_tree,
        });
        Ok(self.post::<ShaResponse>(&url, &body)?.sha)
    }

    fn branch_head(&self, branch: &str) -> Result<String, GitHubClientError> {
        let url = self.repo_url(&format!("git/ref/heads/{}", branch));
        Ok(self.get::<RefResponse>(&url)?.object.sha)
    }

    fn create_commit(
        &self,
        tree: &str,
        parent: &str,
        message: &str,
        committer: &Committer,
    ) -> Result<GitCommit, GitHubClientError> {
        let url = self.repo_url("git/commits");
        let body = json!({
            "message": message,
            "tree": tree,
            "parents": [parent],
            "committer": committer,
        });
        self.post(&url, &body)
    }

    fn compare(&self, base: &str, head: &str) -> Result<Vec<CompareFile>, GitHubClientError> {
        let url = self.repo_url(&format!("compare/{}...{}", base, head));
        Ok(self.get::<CompareResponse>(&url)?.files)
    }

    fn update_branch(&self, branch: &str, sha: &str) -> Result<(), GitHubClientError> {
        let url = self.repo_url(&format!("git/refs/heads/{}", branch));
        let body = json!({ "sha": sha });
        let response = self.send(Method::PATCH, &url, Some(&body))?;
        self.json_response::<Value>(&url, response)?;
        Ok(())
    }

    fn create_branch(&self, branch: &str, sha: &str) -> Result<(), GitHubClientError> {
        let url = self.repo_url("git/refs");
        let body = json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": sha,
        });
        self.post::<Value>(&url, &body)?;
        Ok(())
    }

    fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubClientError> {
        let url = self.repo_url("pulls");
        let body = json!({
            "title": title,
            "head": head,
            "base": base,
        });
        self.post(&url, &body)
    }
}
