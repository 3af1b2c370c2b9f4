//! Request handling.
//!
//! Runs one request through validation, parameter extraction and response
//! synthesis. Validation failures are recorded next to the rendered body;
//! a response is always produced.

use crate::config::{GlobalSettings, MockConfig};
use crate::matcher::{
    EndpointFamily, PathParams, RequestMatcher, Validation, ValidationFailure,
};
use crate::synth::{RenderedResponse, Synthesizer};
use crate::template::TemplateStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOT_FOUND_BODY: &str = r#"{"message": "Not Found"}"#;

/// The parts of an HTTP request the mock looks at.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl IncomingRequest {
    /// A GET request without headers.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Validation outcome paired with the response written for it.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Family the request was handled as (`None` when no family matched)
    pub family: Option<EndpointFamily>,
    pub validation: Validation,
    pub response: RenderedResponse,
}

/// Something that turns a request into a response.
pub trait Respond: Send + Sync {
    fn respond(&self, request: &IncomingRequest) -> HandlerOutcome;
}

/// Matcher and synthesizer built once from a configuration.
pub struct MockApi {
    matcher: RequestMatcher,
    synthesizer: Synthesizer,
    settings: GlobalSettings,
    client_accept: String,
}

impl MockApi {
    /// Validate the configuration and load its templates.
    pub fn new(config: MockConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let templates = TemplateStore::from_settings(&config.templates)?;

        info!(
            syntax = ?templates.syntax(),
            repositories = config.catalog.repositories.len(),
            releases = config.catalog.releases.len(),
            "Mock API initialized"
        );

        Ok(Self {
            matcher: RequestMatcher::new(&config.endpoints),
            synthesizer: Synthesizer::new(Arc::new(templates), config.catalog),
            settings: config.settings,
            client_accept: config.endpoints.client_accept,
        })
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// `Accept` value clients should send.
    pub fn client_accept(&self) -> &str {
        &self.client_accept
    }

    /// Handle a request as the given family.
    pub fn handle(&self, family: EndpointFamily, request: &IncomingRequest) -> HandlerOutcome {
        let mut validation =
            self.matcher
                .validate(family, &request.method, &request.path, &request.headers);

        let params = match self.matcher.extract(family, &request.path) {
            Ok(params) => params,
            Err(failure) => {
                validation.push(failure);
                PathParams {
                    owner: String::new(),
                    name: Some(String::new()),
                }
            }
        };

        let response = match self.synthesizer.render(family, &params) {
            Ok(response) => response,
            Err(e) => {
                validation.push(ValidationFailure::Render {
                    reason: e.to_string(),
                });
                RenderedResponse::fallback(family)
            }
        };

        self.log_outcome(family, request, &params, &validation);

        HandlerOutcome {
            family: Some(family),
            validation,
            response,
        }
    }

    /// Handle a request as whichever family its path matches.
    pub fn route(&self, request: &IncomingRequest) -> HandlerOutcome {
        match self.matcher.identify(&request.path) {
            Some(family) => self.handle(family, request),
            None => {
                if self.settings.log_failures {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        "No endpoint matches request path"
                    );
                }
                let mut validation = Validation::default();
                validation.push(ValidationFailure::ShapeMismatch {
                    path: request.path.clone(),
                    expected: "a supported endpoint".to_string(),
                });
                HandlerOutcome {
                    family: None,
                    validation,
                    response: RenderedResponse {
                        status: 404,
                        body: NOT_FOUND_BODY.to_string(),
                    },
                }
            }
        }
    }

    fn log_outcome(
        &self,
        family: EndpointFamily,
        request: &IncomingRequest,
        params: &PathParams,
        validation: &Validation,
    ) {
        if validation.is_ok() {
            if self.settings.log_matches {
                info!(
                    family = %family,
                    path = %request.path,
                    owner = %params.owner,
                    "Request matched endpoint"
                );
            }
            return;
        }

        if self.settings.log_failures {
            for failure in validation.failures() {
                warn!(
                    family = %family,
                    path = %request.path,
                    %failure,
                    "Request failed validation"
                );
            }
        }
        debug!(family = %family, "Writing best-effort response");
    }
}

/// Serves a single endpoint family.
#[derive(Clone)]
pub struct MockHandler {
    api: Arc<MockApi>,
    family: EndpointFamily,
}

impl MockHandler {
    pub fn new(api: Arc<MockApi>, family: EndpointFamily) -> Self {
        Self { api, family }
    }

    pub fn family(&self) -> EndpointFamily {
        self.family
    }
}

impl Respond for MockHandler {
    fn respond(&self, request: &IncomingRequest) -> HandlerOutcome {
        self.api.handle(self.family, request)
    }
}

/// Serves all families, dispatching on the path.
#[derive(Clone)]
pub struct MockRouter {
    api: Arc<MockApi>,
}

impl MockRouter {
    pub fn new(api: Arc<MockApi>) -> Self {
        Self { api }
    }
}

impl Respond for MockRouter {
    fn respond(&self, request: &IncomingRequest) -> HandlerOutcome {
        self.api.route(request)
    }
}
