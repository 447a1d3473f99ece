use std::thread;

use anyhow::{Context as _, Result};
use mockall::automock;
use wpsync_core::{
    cache::SyncCache,
    config::{GitHubTarget, Project, WordpressSource},
    endpoint::EndpointSync,
    github::{GitHub, GitHubClient},
    notify::{notify_report, LogNotifier, Notifier, Slack},
    report::EndpointReport,
    wordpress::{Wordpress, WordpressClient},
};

use crate::context::Context;

pub const ERROR_TITLE: &str = "Error running wpsync";

/// Build clients of one endpoint
#[automock]
pub trait ClientFactory {
    fn github(&self, target: &GitHubTarget) -> Result<Box<dyn GitHubClient>>;
    fn wordpress(&self, source: &WordpressSource) -> Result<Box<dyn WordpressClient>>;
}

pub struct HttpClients {
    github_token: String,
}

impl HttpClients {
    pub fn new(github_token: String) -> Self {
        Self { github_token }
    }
}

impl ClientFactory for HttpClients {
    fn github(&self, target: &GitHubTarget) -> Result<Box<dyn GitHubClient>> {
        Ok(Box::new(GitHub::new(
            target.owner.clone(),
            target.repo.clone(),
            self.github_token.clone(),
        )?))
    }

    fn wordpress(&self, source: &WordpressSource) -> Result<Box<dyn WordpressClient>> {
        Ok(Box::new(Wordpress::new(source.url.clone())?))
    }
}

pub fn run(context: Context) -> Result<()> {
    log::info!("Start with {:?}", context);
    let clients = HttpClients::new(context.config.github_token.clone());
    let notifier: Box<dyn Notifier> = match &context.config.slack_token {
        Some(token) => Box::new(Slack::new(token.clone())?),
        None => Box::new(LogNotifier),
    };
    let mut cache = SyncCache::new();

    loop {
        let projects = context.projects()?;
        log::info!("Sync {} endpoints", projects.len());
        let reports = run_pass(&context, &projects, &clients, notifier.as_ref(), &mut cache)?;
        log::info!(
            "Pass finished with {} commits",
            reports.iter().map(|report| report.commits.len()).sum::<usize>()
        );

        match context.interval() {
            Some(interval) => {
                log::debug!("Wait {:?} before next pass", interval);
                thread::sleep(interval)
            }
            None => break,
        }
    }

    Ok(())
}

/// Sync given endpoints one after the other. An endpoint failure is reported
/// to the debug channel and does not stop the pass, except in debug mode
/// where it is returned.
pub fn run_pass(
    context: &Context,
    projects: &[Project],
    clients: &dyn ClientFactory,
    notifier: &dyn Notifier,
    cache: &mut SyncCache,
) -> Result<Vec<EndpointReport>> {
    let mut reports = vec![];

    for project in projects {
        log::info!("Sync endpoint {}", project.name);
        match sync_project(context, project, clients, cache) {
            Ok(Some(report)) => {
                if let Some(channel) = &project.reporting_channel_slack {
                    if let Err(error) = notify_report(notifier, channel, &report) {
                        log::error!("Unable to notify report of {} : {}", project.name, error);
                    }
                }
                reports.push(report);
            }
            Ok(None) => {}
            Err(error) => {
                if context.debug() {
                    return Err(error);
                }

                log::error!("Endpoint {} failed : {:?}", project.name, error);
                if let Some(channel) = &context.config.debug_channel {
                    if let Err(notify_error) =
                        notifier.report_error(channel, ERROR_TITLE, &format!("{:?}", error))
                    {
                        log::error!("Unable to report error : {}", notify_error);
                    }
                }
            }
        }
    }

    Ok(reports)
}

fn sync_project(
    context: &Context,
    project: &Project,
    clients: &dyn ClientFactory,
    cache: &mut SyncCache,
) -> Result<Option<EndpointReport>> {
    let github = clients.github(&project.github_target)?;
    let wordpress = clients.wordpress(&project.wordpress_source)?;

    EndpointSync::new(
        project,
        github.as_ref(),
        wordpress.as_ref(),
        context.config.committer.clone(),
    )
    .run(cache)
    .context(format!("Sync endpoint {}", project.name))
}

#[cfg(test)]
mod test {
    use super::*;
    use mockall::predicate;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use wpsync_core::{
        config::AppConfig,
        github::{Committer, GitHubClientError, MockGitHubClient},
        notify::MockNotifier,
        wordpress::MockWordpressClient,
    };

    fn context(debug: bool) -> Context {
        Context::new(
            AppConfig {
                github_token: "token".to_string(),
                committer: Committer {
                    name: "Sync Bot".to_string(),
                    email: "bot@example.gov".to_string(),
                },
                slack_token: None,
                debug_channel: Some("DEBUG".to_string()),
                endpoints_file: PathBuf::from("endpoints.json"),
                debug,
                interval: None,
            },
            vec![],
        )
    }

    fn project(name: &str) -> Project {
        serde_json::from_value(json!({
            "name": name,
            "enabled": true,
            "ReportingChannel_Slack": "REPORTS",
            "WordPressSource": {"url": format!("https://{}.example.gov", name)},
            "GitHubTarget": {
                "Owner": "cagov",
                "Repo": name,
                "Branch": "main",
                "ConfigPath": "wordpress/config.json"
            }
        }))
        .unwrap()
    }

    fn clients(disabled: bool) -> MockClientFactory {
        let mut clients = MockClientFactory::new();
        clients.expect_github().returning(move |target| {
            let mut github = MockGitHubClient::new();
            if target.repo == "broken" {
                github
                    .expect_json_file()
                    .returning(|_, path| Err(GitHubClientError::NotFound(path.to_string())));
            } else {
                github
                    .expect_json_file()
                    .returning(move |_, _| Ok(json!({"data": {"disabled": disabled}})));
            }
            Ok(Box::new(github))
        });
        clients
            .expect_wordpress()
            .returning(|_| Ok(Box::new(MockWordpressClient::new())));
        clients
    }

    #[test]
    fn test_failed_endpoint_is_reported_and_pass_continues() {
        // Given
        let mut notifier = MockNotifier::new();
        notifier
            .expect_report_error()
            .withf(|channel, title, error| {
                channel == "DEBUG" && title == ERROR_TITLE && error.contains("Sync endpoint broken")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        notifier.expect_post().never();
        let projects = vec![project("broken"), project("news")];
        let mut cache = SyncCache::new();

        // When
        let reports = run_pass(
            &context(false),
            &projects,
            &clients(true),
            &notifier,
            &mut cache,
        )
        .unwrap();

        // Then
        assert_eq!(reports, vec![]);
    }

    #[test]
    fn test_failed_endpoint_is_returned_in_debug_mode() {
        // Given
        let mut notifier = MockNotifier::new();
        notifier.expect_report_error().never();
        let projects = vec![project("broken"), project("news")];
        let mut clients = MockClientFactory::new();
        clients
            .expect_github()
            .with(predicate::function(|target: &GitHubTarget| target.repo == "broken"))
            .times(1)
            .returning(|_| {
                let mut github = MockGitHubClient::new();
                github
                    .expect_json_file()
                    .returning(|_, path| Err(GitHubClientError::NotFound(path.to_string())));
                Ok(Box::new(github))
            });
        clients
            .expect_wordpress()
            .times(1)
            .returning(|_| Ok(Box::new(MockWordpressClient::new())));

        // When
        let result = run_pass(
            &context(true),
            &projects,
            &clients,
            &notifier,
            &mut SyncCache::new(),
        );

        // Then
        assert!(result.is_err());
    }

    #[test]
    fn test_disabled_endpoints_give_no_report() {
        let notifier = MockNotifier::new();
        let projects = vec![project("news"), project("blog")];

        let reports = run_pass(
            &context(false),
            &projects,
            &clients(true),
            &notifier,
            &mut SyncCache::new(),
        )
        .unwrap();

        assert!(reports.is_empty());
    }
}
