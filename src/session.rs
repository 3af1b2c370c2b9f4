//! Single-use mock sessions.
//!
//! A session starts a listener for one endpoint family, drives a real HTTP
//! client against it, tears the listener down and hands back the decoded
//! records. Failures go to an attached `Reporter`; without one the session
//! substitutes in-memory fixtures.

use crate::fixture;
use crate::handler::{MockApi, MockHandler};
use crate::matcher::{EndpointFamily, ValidationFailure};
use crate::model::{Release, Repository};
use crate::server::MockListener;
use parking_lot::Mutex;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    RequestReceived,
    Responded,
    Closed,
}

/// Client-side failures of a round trip.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session was already used")]
    AlreadyUsed,

    #[error("Failed to start listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("{operation} returned error: {source}")]
    Transport {
        operation: &'static str,
        source: reqwest::Error,
    },

    #[error("{operation} did not get an OK HTTP response ({status})")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("{operation} returned an undecodable body: {source}")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("{operation} mock response failed: {reason}")]
    UnexpectedShape {
        operation: &'static str,
        reason: String,
    },
}

/// Something that went wrong during a session.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// The handler rejected the request
    Validation(&'a ValidationFailure),
    /// The client could not complete the round trip
    Session(&'a SessionError),
}

impl fmt::Display for Failure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Validation(failure) => write!(f, "{}", failure),
            Failure::Session(error) => write!(f, "{}", error),
        }
    }
}

/// Sink for session failures, usually tied to the running test.
pub trait Reporter: Send + Sync {
    fn report(&self, failure: Failure<'_>);
}

/// Keeps every reported failure as a message.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, failure: Failure<'_>) {
        self.messages.lock().push(failure.to_string());
    }
}

/// Logs failures at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, failure: Failure<'_>) {
        error!(%failure, "Mock session failure");
    }
}

/// One listener, one request, one result.
pub struct MockSession {
    api: Arc<MockApi>,
    reporter: Option<Arc<dyn Reporter>>,
    accept: String,
    history: Vec<SessionState>,
}

impl MockSession {
    pub fn new(api: Arc<MockApi>, reporter: Option<Arc<dyn Reporter>>) -> Self {
        let accept = api.client_accept().to_string();
        Self {
            api,
            reporter,
            accept,
            history: vec![SessionState::Idle],
        }
    }

    /// Override the `Accept` header the client sends.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.history.last().copied().unwrap_or(SessionState::Idle)
    }

    /// Every state the session has been in, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// `GET /repos/{owner}/{name}`
    pub async fn repository(&mut self, owner: &str, name: &str) -> Option<Repository> {
        let operation = operation_name(EndpointFamily::Repository);
        let result = self
            .round_trip::<Repository>(EndpointFamily::Repository, owner, name)
            .await
            .and_then(|repo| {
                if repo.owner.login != owner || repo.name != name {
                    return Err(SessionError::UnexpectedShape {
                        operation,
                        reason: format!("got {}, expected {}/{}", repo.full_name, owner, name),
                    });
                }
                Ok(repo)
            });

        self.finish(result, || fixture::repository(owner, name))
    }

    /// `GET /users/{owner}/repos`
    pub async fn repository_list(&mut self, owner: &str) -> Option<Vec<Repository>> {
        let operation = operation_name(EndpointFamily::RepositoryList);
        let result = self
            .round_trip::<Vec<Repository>>(EndpointFamily::RepositoryList, owner, "")
            .await
            .and_then(|repos| match repos.first() {
                None => Err(SessionError::UnexpectedShape {
                    operation,
                    reason: "empty list".to_string(),
                }),
                Some(first) if first.owner.login != owner => Err(SessionError::UnexpectedShape {
                    operation,
                    reason: format!("first owner is {}, expected {}", first.owner.login, owner),
                }),
                Some(_) => Ok(repos),
            });

        let names = self.api.synthesizer().catalog().repositories.clone();
        self.finish(result, || fixture::repository_list(owner, &names))
    }

    /// `GET /repos/{owner}/{repo}/releases`
    pub async fn release_list(&mut self, owner: &str, repo: &str) -> Option<Vec<Release>> {
        let operation = operation_name(EndpointFamily::ReleaseList);
        let catalog = self.api.synthesizer().catalog().clone();
        let expected = catalog.most_mature_release();

        let result = self
            .round_trip::<Vec<Release>>(EndpointFamily::ReleaseList, owner, repo)
            .await
            .and_then(|releases| match (releases.last(), &expected) {
                (Some(last), Some(tier)) if last.name == tier.name && last.tag_name == tier.tag => {
                    Ok(releases)
                }
                (Some(last), _) => Err(SessionError::UnexpectedShape {
                    operation,
                    reason: format!("last release is {} ({})", last.name, last.tag_name),
                }),
                (None, _) => Err(SessionError::UnexpectedShape {
                    operation,
                    reason: "empty list".to_string(),
                }),
            });

        self.finish(result, || fixture::release_list(owner, &catalog.releases))
    }

    async fn round_trip<T: DeserializeOwned>(
        &mut self,
        family: EndpointFamily,
        owner: &str,
        name: &str,
    ) -> Result<T, SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::AlreadyUsed);
        }

        let listener = match MockListener::start(MockHandler::new(self.api.clone(), family)).await
        {
            Ok(listener) => listener,
            Err(e) => {
                self.transition(SessionState::Closed);
                return Err(e.into());
            }
        };
        self.transition(SessionState::Listening);

        let url = format!(
            "{}{}",
            listener.base_url(),
            self.api.matcher().path_for(family, owner, name)
        );
        let result = self.fetch::<T>(operation_name(family), &url).await;

        let log = listener.shutdown().await;
        if log.requests > 0 {
            self.transition(SessionState::RequestReceived);
        }
        if log.responses > 0 {
            self.transition(SessionState::Responded);
        }
        self.transition(SessionState::Closed);

        for failure in &log.failures {
            match &self.reporter {
                Some(reporter) => reporter.report(Failure::Validation(failure)),
                None => warn!(family = %family, %failure, "Mock request failed validation"),
            }
        }

        result
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
    ) -> Result<T, SessionError> {
        let transport = |source| SessionError::Transport { operation, source };

        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(transport)?;
        debug!(%url, operation, "Sending mock request");

        let resp = client
            .get(url)
            .header(ACCEPT, &self.accept)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(SessionError::Status { operation, status });
        }

        let body = resp.text().await.map_err(transport)?;
        serde_json::from_str(&body).map_err(|source| SessionError::Decode { operation, source })
    }

    fn finish<T>(
        &self,
        result: Result<T, SessionError>,
        fallback: impl FnOnce() -> T,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => match &self.reporter {
                Some(reporter) => {
                    reporter.report(Failure::Session(&e));
                    None
                }
                None => {
                    warn!(error = %e, "Mock session failed, substituting fixture");
                    Some(fallback())
                }
            },
        }
    }

    fn transition(&mut self, state: SessionState) {
        debug!(from = ?self.state(), to = ?state, "Session transition");
        self.history.push(state);
    }
}

fn operation_name(family: EndpointFamily) -> &'static str {
    match family {
        EndpointFamily::Repository => "Repositories.Get",
        EndpointFamily::RepositoryList => "Repositories.List",
        EndpointFamily::ReleaseList => "Repositories.ListReleases",
    }
}
