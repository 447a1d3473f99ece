use chrono::{DateTime, Utc};

use crate::{
    chunk::{chunk, DEFAULT_PAYLOAD_CEILING},
    error::SyncError,
    github::{Committer, GitHubClient},
    report::{CommitReport, PullRequestReport},
    tree::ChangeSet,
    utils::branch_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Fast forward the base branch to the new commit
    Commit,
    /// Put the new commit on a side branch and open a pull request
    PullRequest,
}

impl From<bool> for PublishMode {
    fn from(pull_request: bool) -> Self {
        if pull_request {
            Self::PullRequest
        } else {
            Self::Commit
        }
    }
}

/// Turn change sets into commits on one branch
pub struct Publisher<'a> {
    client: &'a dyn GitHubClient,
    branch: String,
    committer: Committer,
    mode: PublishMode,
    payload_ceiling: usize,
    now: fn() -> DateTime<Utc>,
}

impl<'a> Publisher<'a> {
    pub fn new(
        client: &'a dyn GitHubClient,
        branch: String,
        committer: Committer,
        mode: PublishMode,
    ) -> Self {
        Self {
            client,
            branch,
            committer,
            mode,
            payload_ceiling: DEFAULT_PAYLOAD_CEILING,
            now: Utc::now,
        }
    }

    pub fn with_payload_ceiling(mut self, payload_ceiling: usize) -> Self {
        self.payload_ceiling = payload_ceiling;
        self
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Commit `changes` with `title` as message. Return `None` when there is
    /// nothing to change on the branch.
    pub fn publish(
        &self,
        changes: ChangeSet,
        title: &str,
    ) -> Result<Option<CommitReport>, SyncError> {
        if changes.is_empty() {
            return Ok(None);
        }
        if let Some(pending) = changes.iter().find(|entry| entry.is_pending()) {
            return Err(SyncError::PendingBinary(pending.path.clone()));
        }

        let total = changes.len();
        log::info!(
            "Tree data is {} bytes",
            serde_json::to_string(&changes)?.len()
        );
        let parts = chunk(changes, self.payload_ceiling)?;

        let base_sha = self.client.branch_head(&self.branch)?;
        let mut tree_sha = base_sha.clone();
        let mut count = 0;
        for part in &parts {
            count += part.len();
            log::info!("Creating tree for {} - {}/{} items", title, count, total);
            tree_sha = self.client.create_tree(part, &tree_sha)?;
        }

        let commit = self
            .client
            .create_commit(&tree_sha, &base_sha, title, &self.committer)?;
        let files = self.client.compare(&base_sha, &commit.sha)?;
        if files.is_empty() {
            log::info!("no changes");
            return Ok(None);
        }
        log::info!("{} changes.", files.len());

        let pull_request = match self.mode {
            PublishMode::Commit => {
                self.client.update_branch(&self.branch, &commit.sha)?;
                log::info!("Commit created - {}", commit.html_url);
                None
            }
            PublishMode::PullRequest => {
                let head = branch_name(title, (self.now)());
                self.client.create_branch(&head, &commit.sha)?;
                let pull_request = self
                    .client
                    .create_pull_request(title, &head, &self.branch)?;
                log::info!("PR created - {}", pull_request.html_url);
                Some(PullRequestReport::from(pull_request))
            }
        };

        Ok(Some(CommitReport {
            commit,
            files,
            pull_request,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        github::{CompareFile, GitCommit, MockGitHubClient, PullRequest, PullRequestHead},
        tree::TreeEntry,
    };
    use chrono::TimeZone;
    use mockall::{predicate, Sequence};
    use pretty_assertions::assert_eq;

    fn committer() -> Committer {
        Committer {
            name: "Sync Bot".to_string(),
            email: "bot@example.gov".to_string(),
        }
    }

    fn commit() -> GitCommit {
        GitCommit {
            sha: "commit1".to_string(),
            html_url: "https://github.com/cagov/news/commit/commit1".to_string(),
            message: "Wordpress Posts Update (1 updates)".to_string(),
        }
    }

    fn changed() -> Vec<CompareFile> {
        vec![CompareFile {
            filename: "wordpress/posts/a.html".to_string(),
            status: "modified".to_string(),
        }]
    }

    fn changes() -> ChangeSet {
        vec![
            TreeEntry::content("wordpress/posts/a.html".to_string(), "<p>a</p>".to_string()),
            TreeEntry::delete("wordpress/posts/b.html".to_string()),
        ]
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 31, 12, 5, 9).unwrap()
    }

    fn expect_tree_and_commit(client: &mut MockGitHubClient) {
        client
            .expect_branch_head()
            .with(predicate::eq("main"))
            .times(1)
            .returning(|_| Ok("head1".to_string()));
        client
            .expect_create_tree()
            .withf(|entries, base| entries.len() == 2 && base == "head1")
            .times(1)
            .returning(|_, _| Ok("tree1".to_string()));
        client
            .expect_create_commit()
            .withf(|tree, parent, message, committer| {
                tree == "tree1"
                    && parent == "head1"
                    && message == "Wordpress Posts Update (1 updates)"
                    && committer.name == "Sync Bot"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(commit()));
    }

    #[test]
    fn test_empty_change_set_makes_no_call() {
        // Given
        let client = MockGitHubClient::new();
        let publisher =
            Publisher::new(&client, "main".to_string(), committer(), PublishMode::Commit);

        // When
        let report = publisher.publish(vec![], "Wordpress Posts Update (0 updates)").unwrap();

        // Then
        assert_eq!(report, None);
    }

    #[test]
    fn test_no_difference_after_compare_is_noop() {
        // Given
        let mut client = MockGitHubClient::new();
        expect_tree_and_commit(&mut client);
        client
            .expect_compare()
            .with(predicate::eq("head1"), predicate::eq("commit1"))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        client.expect_update_branch().never();
        client.expect_create_branch().never();
        let publisher =
            Publisher::new(&client, "main".to_string(), committer(), PublishMode::Commit);

        // When
        let report = publisher
            .publish(changes(), "Wordpress Posts Update (1 updates)")
            .unwrap();

        // Then
        assert_eq!(report, None);
    }

    #[test]
    fn test_commit_mode_fast_forwards_branch() {
        // Given
        let mut client = MockGitHubClient::new();
        expect_tree_and_commit(&mut client);
        client
            .expect_compare()
            .times(1)
            .returning(|_, _| Ok(changed()));
        client
            .expect_update_branch()
            .with(predicate::eq("main"), predicate::eq("commit1"))
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_create_pull_request().never();
        let publisher =
            Publisher::new(&client, "main".to_string(), committer(), PublishMode::Commit);

        // When
        let report = publisher
            .publish(changes(), "Wordpress Posts Update (1 updates)")
            .unwrap();

        // Then
        assert_eq!(
            report,
            Some(CommitReport {
                commit: commit(),
                files: changed(),
                pull_request: None,
            })
        );
    }

    #[test]
    fn test_pull_request_mode() {
        // Given
        let mut client = MockGitHubClient::new();
        expect_tree_and_commit(&mut client);
        client
            .expect_compare()
            .times(1)
            .returning(|_, _| Ok(changed()));
        client.expect_update_branch().never();
        client
            .expect_create_branch()
            .with(
                predicate::eq("Wordpress-Posts-Update-1-updates-2023-01-31T12-05-09Z"),
                predicate::eq("commit1"),
            )
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_create_pull_request()
            .with(
                predicate::eq("Wordpress Posts Update (1 updates)"),
                predicate::eq("Wordpress-Posts-Update-1-updates-2023-01-31T12-05-09Z"),
                predicate::eq("main"),
            )
            .times(1)
            .returning(|_, head, _| {
                Ok(PullRequest {
                    html_url: "https://github.com/cagov/news/pull/7".to_string(),
                    number: 7,
                    head: PullRequestHead {
                        ref_: head.to_string(),
                    },
                })
            });
        let publisher = Publisher::new(
            &client,
            "main".to_string(),
            committer(),
            PublishMode::PullRequest,
        )
        .with_clock(fixed_now);

        // When
        let report = publisher
            .publish(changes(), "Wordpress Posts Update (1 updates)")
            .unwrap();

        // Then
        assert_eq!(
            report.and_then(|report| report.pull_request),
            Some(PullRequestReport {
                html_url: "https://github.com/cagov/news/pull/7".to_string(),
                number: 7,
                head_ref: "Wordpress-Posts-Update-1-updates-2023-01-31T12-05-09Z".to_string(),
            })
        );
    }

    #[test]
    fn test_chunked_trees_are_chained() {
        // Given
        let mut client = MockGitHubClient::new();
        let mut sequence = Sequence::new();
        let changes: ChangeSet = (0..4)
            .map(|i| TreeEntry::content(format!("p/{}.html", i), "x".repeat(100)))
            .collect();
        let entry_size = serde_json::to_string(&changes[0]).unwrap().len();
        client
            .expect_branch_head()
            .times(1)
            .returning(|_| Ok("head1".to_string()));
        client
            .expect_create_tree()
            .withf(|entries, base| entries[0].path == "p/0.html" && base == "head1")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok("tree1".to_string()));
        client
            .expect_create_tree()
            .withf(|entries, base| entries[0].path == "p/2.html" && base == "tree1")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok("tree2".to_string()));
        client
            .expect_create_commit()
            .withf(|tree, parent, _, _| tree == "tree2" && parent == "head1")
            .times(1)
            .returning(|_, _, _, _| Ok(commit()));
        client
            .expect_compare()
            .times(1)
            .returning(|_, _| Ok(changed()));
        client
            .expect_update_branch()
            .times(1)
            .returning(|_, _| Ok(()));
        let publisher =
            Publisher::new(&client, "main".to_string(), committer(), PublishMode::Commit)
                .with_payload_ceiling(entry_size * 2 + 10);

        // When
        let report = publisher.publish(changes, "Wordpress Posts Update (4 updates)").unwrap();

        // Then
        assert!(report.is_some());
    }

    #[test]
    fn test_pending_binary_is_refused() {
        let client = MockGitHubClient::new();
        let publisher =
            Publisher::new(&client, "main".to_string(), committer(), PublishMode::Commit);

        let result = publisher.publish(
            vec![TreeEntry::pending("media/a.png".to_string())],
            "Wordpress Media Update (1 updates)",
        );

        assert!(matches!(result, Err(SyncError::PendingBinary(path)) if path == "media/a.png"));
    }
}
