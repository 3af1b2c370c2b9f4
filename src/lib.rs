//! GitHub API Mock
//!
//! A mock of three GitHub REST endpoints for testing client code without
//! network access. Requests are validated, path parameters extracted, and
//! deterministic JSON bodies rendered from record templates.
//!
//! # Endpoints
//!
//! - `GET /repos/{owner}/{repo}`: one repository record
//! - `GET /users/{owner}/repos`: one record per catalog repository
//! - `GET /repos/{owner}/{repo}/releases`: one record per release tier,
//!   least mature first
//!
//! Every request must send an `Accept` header naming a structured JSON
//! media type such as `application/vnd.github.v3+json`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use github_api_mock::{CollectingReporter, MockApi, MockConfig, MockSession};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let api = Arc::new(MockApi::new(MockConfig::default())?);
//! let reporter = Arc::new(CollectingReporter::new());
//!
//! let releases = MockSession::new(api, Some(reporter.clone()))
//!     .release_list("mattermost", "mattermost-plugin-github")
//!     .await;
//! assert_eq!(releases.unwrap().last().unwrap().tag_name, "v1.0.0");
//! assert!(reporter.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod fixture;
pub mod handler;
pub mod matcher;
pub mod model;
pub mod server;
pub mod session;
pub mod synth;
pub mod template;

pub use config::MockConfig;
pub use handler::{MockApi, MockHandler, MockRouter};
pub use matcher::EndpointFamily;
pub use server::MockListener;
pub use session::{CollectingReporter, MockSession, Reporter};
