use std::time::Duration;

use mockall::automock;
use reqwest::{blocking::RequestBuilder, Method};
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::{report::EndpointReport, retry::RetryPolicy};

pub const DEFAULT_SLACK_API_ADDRESS: &str = "https://slack.com/api";
pub const DEFAULT_CLIENT_TIMEOUT: u64 = 30;
const ERROR_THREAD_WINDOW_SECONDS: f64 = 3600.0;

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Connection error")]
    ConnectionError,
    #[error("Timeout error")]
    TimeoutError,
    #[error("Slack api refused the request: {0}")]
    Refused(String),
    #[error("Unexpected response status {0}")]
    UnexpectedStatus(u16),
    #[error("Unknown error: `{0}`")]
    Unknown(String),
}

impl From<reqwest::Error> for NotifierError {
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

/// Chat channel where sync results are published
#[automock]
pub trait Notifier: Send + Sync {
    /// Post a new message and return its thread identifier
    fn post(&self, channel: &str, text: &str) -> Result<String, NotifierError>;
    fn reply(&self, channel: &str, thread: &str, text: &str) -> Result<(), NotifierError>;
    /// Post an error, grouped with a recent message of the same title when any
    fn report_error(&self, channel: &str, title: &str, error: &str)
        -> Result<(), NotifierError>;
}

/// Thread root with changed file names, then one reply per commit
pub fn notify_report(
    notifier: &dyn Notifier,
    channel: &str,
    report: &EndpointReport,
) -> Result<(), NotifierError> {
    if report.is_empty() {
        return Ok(());
    }

    let thread = notifier.post(channel, &report.headline())?;
    for commit in &report.commits {
        notifier.reply(channel, &thread, &commit.summary())?;
    }

    Ok(())
}

pub fn error_text(title: &str, error: &str) -> String {
    format!("{}\n*Error Stack*\n```{}```", title, error)
}

#[derive(Deserialize, Debug)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlackMessage {
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub latest_reply: Option<String>,
}

impl SlackMessage {
    fn last_activity(&self) -> f64 {
        self.latest_reply
            .as_ref()
            .unwrap_or(&self.ts)
            .parse::<f64>()
            .unwrap_or(0.0)
    }
}

#[derive(Clone)]
pub struct Slack {
    api_address: String,
    token: String,
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl Slack {
    pub fn new(token: String) -> Result<Self, NotifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CLIENT_TIMEOUT))
            .build()?;
        Ok(Self {
            api_address: DEFAULT_SLACK_API_ADDRESS.to_string(),
            token,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_api_address(mut self, api_address: String) -> Self {
        self.api_address = api_address;
        self
    }

    fn call<F>(&self, build: F) -> Result<SlackResponse, NotifierError>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.retry.send(build)?;
        if !response.status().is_success() {
            return Err(NotifierError::UnexpectedStatus(response.status().as_u16()));
        }

        let response = response.json::<SlackResponse>()?;
        if !response.ok {
            return Err(NotifierError::Refused(
                response.error.unwrap_or("unknown".to_string()),
            ));
        }

        Ok(response)
    }

    fn post_message(
        &self,
        channel: &str,
        thread: Option<&str>,
        text: &str,
    ) -> Result<SlackResponse, NotifierError> {
        let url = format!("{}/chat.postMessage", self.api_address);
        let mut payload = json!({"channel": channel, "text": text});
        if let Some(thread) = thread {
            payload["thread_ts"] = json!(thread);
        }

        self.call(|| {
            self.client
                .request(Method::POST, &url)
                .bearer_auth(&self.token)
                .json(&payload)
        })
    }

    fn history(&self, channel: &str) -> Result<Vec<SlackMessage>, NotifierError> {
        let url = format!("{}/conversations.history", self.api_address);
        let response = self.call(|| {
            self.client
                .request(Method::GET, &url)
                .bearer_auth(&self.token)
                .query(&[("channel", channel)])
        })?;
        Ok(response.messages)
    }
}

impl Notifier for Slack {
    fn post(&self, channel: &str, text: &str) -> Result<String, NotifierError> {
        self.post_message(channel, None, text)?
            .ts
            .ok_or(NotifierError::Refused("No ts in response".to_string()))
    }

    fn reply(&self, channel: &str, thread: &str, text: &str) -> Result<(), NotifierError> {
        self.post_message(channel, Some(thread), text)?;
        Ok(())
    }

    fn report_error(
        &self,
        channel: &str,
        title: &str,
        error: &str,
    ) -> Result<(), NotifierError> {
        let text = error_text(title, error);
        let now = chrono::Utc::now().timestamp() as f64;
        let history = self.history(channel)?;

        match recent_error_thread(&history, title, now) {
            Some(thread) => self.reply(channel, &thread, &text),
            None => self.post(channel, &text).map(|_| ()),
        }
    }
}

/// Thread of the last hour which reported an error with the same title
pub fn recent_error_thread(history: &[SlackMessage], title: &str, now: f64) -> Option<String> {
    let prefix = format!("{}\n", title);
    history
        .iter()
        .find(|message| {
            message.text.starts_with(&prefix)
                && now - message.last_activity() < ERROR_THREAD_WINDOW_SECONDS
        })
        .map(|message| message.ts.clone())
}

/// Used when no chat is configured: everything goes to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn post(&self, channel: &str, text: &str) -> Result<String, NotifierError> {
        log::info!("[{}] {}", channel, text);
        Ok(channel.to_string())
    }

    fn reply(&self, channel: &str, _thread: &str, text: &str) -> Result<(), NotifierError> {
        log::info!("[{}] > {}", channel, text);
        Ok(())
    }

    fn report_error(
        &self,
        channel: &str,
        title: &str,
        error: &str,
    ) -> Result<(), NotifierError> {
        log::error!("[{}] {}", channel, error_text(title, error));
        Ok(())
    }
}
