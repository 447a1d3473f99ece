use std::{thread, time::Duration};

use reqwest::{
    blocking::{RequestBuilder, Response},
    StatusCode,
};

pub const DEFAULT_RETRY_COUNT: usize = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Fixed count, fixed delay retry of transient http failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRY_COUNT,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Send the request built by `build` until it succeed, fail with a
    /// definitive error or retries are exhausted. The last response (or error)
    /// is returned as is, status codes are not turned into errors here.
    pub fn send<F>(&self, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let retry_allowed = attempt < self.retries;
            match build().send() {
                Ok(response) if retry_allowed && is_transient_status(response.status()) => {
                    log::warn!(
                        "Transient response status {} for {}, retry ({}/{})",
                        response.status(),
                        response.url(),
                        attempt + 1,
                        self.retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(error) if retry_allowed && is_transient_error(&error) => {
                    log::warn!(
                        "Transient request error '{}', retry ({}/{})",
                        error,
                        attempt + 1,
                        self.retries
                    );
                }
                Err(error) => return Err(error),
            }

            attempt += 1;
            thread::sleep(self.delay);
        }
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{Reply, ScriptedServer};
    use reqwest::Method;
    use rstest::*;

    fn send_to(server: &ScriptedServer, policy: RetryPolicy) -> u16 {
        let client = reqwest::blocking::Client::new();
        let url = format!("{}/resource", server.address());
        policy
            .send(|| client.request(Method::GET, &url))
            .unwrap()
            .status()
            .as_u16()
    }

    #[rstest]
    #[case(vec![500, 200], 200, 2)]
    #[case(vec![429, 200], 200, 2)]
    #[case(vec![502, 503, 200], 200, 3)]
    #[case(vec![500, 500, 500, 500], 500, 4)]
    #[case(vec![403], 403, 1)]
    #[case(vec![404], 404, 1)]
    fn test_send_retries_transient_statuses(
        #[case] statuses: Vec<u16>,
        #[case] expected_status: u16,
        #[case] expected_requests: usize,
    ) {
        // Given
        let server = ScriptedServer::start(
            statuses
                .iter()
                .map(|status| Reply::new(*status, ""))
                .collect(),
        );

        // When
        let status = send_to(&server, RetryPolicy::new(3, Duration::ZERO));

        // Then
        assert_eq!(status, expected_status);
        assert_eq!(server.received().len(), expected_requests);
    }

    #[test]
    fn test_no_retry_policy_sends_once() {
        // Given
        let server = ScriptedServer::start(vec![Reply::new(500, "")]);

        // When
        let status = send_to(&server, RetryPolicy::none());

        // Then
        assert_eq!(status, 500);
        assert_eq!(server.received().len(), 1);
    }

    #[rstest]
    #[case(200, false)]
    #[case(304, false)]
    #[case(400, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(422, false)]
    #[case(429, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    fn test_is_transient_status(#[case] status: u16, #[case] expected: bool) {
        assert_eq!(
            is_transient_status(StatusCode::from_u16(status).unwrap()),
            expected
        );
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }
}
