use std::fmt;
use std::time::Duration;

use anyhow::Result;
use wpsync_core::config::{AppConfig, Project, ProjectsFile};

#[derive(Clone)]
pub struct Context {
    pub config: AppConfig,
    /// Only sync endpoints with these names (all when empty)
    pub endpoint_filter: Vec<String>,
}

impl Context {
    pub fn new(config: AppConfig, endpoint_filter: Vec<String>) -> Self {
        Self {
            config,
            endpoint_filter,
        }
    }

    pub fn debug(&self) -> bool {
        self.config.debug
    }

    pub fn interval(&self) -> Option<Duration> {
        self.config.interval
    }

    /// Endpoints to sync during a pass, read again at each pass
    pub fn projects(&self) -> Result<Vec<Project>> {
        let projects = ProjectsFile::load(&self.config.endpoints_file)?.data.projects;
        Ok(select_projects(projects, self.debug(), &self.endpoint_filter))
    }
}

pub fn select_projects(projects: Vec<Project>, debug: bool, filter: &[String]) -> Vec<Project> {
    projects
        .into_iter()
        .filter(|project| project.active(debug))
        .filter(|project| filter.is_empty() || filter.contains(&project.name))
        .collect()
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("committer", &self.config.committer)
            .field("endpoints_file", &self.config.endpoints_file)
            .field("debug_channel", &self.config.debug_channel)
            .field("debug", &self.config.debug)
            .field("interval", &self.config.interval)
            .field("endpoint_filter", &self.endpoint_filter)
            .finish()
    }
}
