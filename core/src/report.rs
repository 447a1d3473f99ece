use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};

use crate::{
    github::{CompareFile, GitCommit, PullRequest},
    utils::{base_name, file_name},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PullRequestReport {
    pub html_url: String,
    pub number: u64,
    pub head_ref: String,
}

impl From<PullRequest> for PullRequestReport {
    fn from(pull_request: PullRequest) -> Self {
        Self {
            html_url: pull_request.html_url,
            number: pull_request.number,
            head_ref: pull_request.head.ref_,
        }
    }
}

/// Result of one published content class
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub commit: GitCommit,
    pub files: Vec<CompareFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestReport>,
}

impl CommitReport {
    /// Link to the commit followed by one line per changed file
    pub fn summary(&self) -> String {
        let files = self
            .files
            .iter()
            .map(|file| format!("• {} - _{}_", file.status, file_name(&file.filename)))
            .join("\n");
        let mut summary = format!(
            "<{}|{}>\n{}",
            self.commit.html_url, self.commit.message, files
        );
        if let Some(pull_request) = &self.pull_request {
            summary.push_str(&format!(
                "\n<{}|Pull request #{}>",
                pull_request.html_url, pull_request.number
            ));
        }

        summary
    }
}

/// Every class published for one endpoint during one pass
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub endpoint: String,
    pub commits: Vec<CommitReport>,
}

impl EndpointReport {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            commits: vec![],
        }
    }

    pub fn push(&mut self, report: Option<CommitReport>) {
        if let Some(report) = report {
            self.commits.push(report)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Endpoint name and the unique names of changed files, without extension
    pub fn headline(&self) -> String {
        let names = self
            .commits
            .iter()
            .flat_map(|commit| commit.files.iter())
            .map(|file| base_name(&file.filename))
            .unique()
            .join(", ");

        format!("{} - _{}_", self.endpoint, names)
    }
}
