//! Request matching logic.
//!
//! Validates incoming requests against the three endpoint families and
//! extracts the owner and repository names from their paths.

use crate::config::EndpointSettings;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// One of the supported URL shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointFamily {
    /// `/repos/{owner}/{repo}`
    Repository,
    /// `/users/{owner}/repos`
    RepositoryList,
    /// `/repos/{owner}/{repo}/releases`
    ReleaseList,
}

impl EndpointFamily {
    pub const ALL: [EndpointFamily; 3] = [
        EndpointFamily::Repository,
        EndpointFamily::RepositoryList,
        EndpointFamily::ReleaseList,
    ];

    /// Number of path parameters the family carries.
    pub fn arity(self) -> usize {
        match self {
            EndpointFamily::RepositoryList => 1,
            EndpointFamily::Repository | EndpointFamily::ReleaseList => 2,
        }
    }

    /// Number of literal segments following the parameters.
    fn suffix_len(self) -> usize {
        match self {
            EndpointFamily::Repository => 0,
            EndpointFamily::RepositoryList | EndpointFamily::ReleaseList => 1,
        }
    }

    fn index(self) -> usize {
        match self {
            EndpointFamily::Repository => 0,
            EndpointFamily::RepositoryList => 1,
            EndpointFamily::ReleaseList => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointFamily::Repository => "repository",
            EndpointFamily::RepositoryList => "repository_list",
            EndpointFamily::ReleaseList => "release_list",
        }
    }
}

impl fmt::Display for EndpointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reason a request failed validation.
///
/// Failures are recorded, never thrown: the handler still writes a
/// response after recording them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Invalid {family} path pattern: {reason}")]
    InvalidPattern {
        family: EndpointFamily,
        reason: String,
    },

    #[error("Regex match fail: {family} pattern rejects canonical path {sample:?}")]
    RegexSelfCheck {
        family: EndpointFamily,
        sample: String,
    },

    #[error("Request path {path:?} was not \"{expected}\"")]
    ShapeMismatch { path: String, expected: String },

    #[error("Request does not accept JSON response (Accept: {accept:?})")]
    NotAcceptable { accept: Option<String> },

    #[error("Request method {method} is not GET")]
    MethodNotAllowed { method: String },

    #[error("Request path {path:?} is missing path parameters ({expected} expected)")]
    MissingParameters { path: String, expected: usize },

    #[error("Received request #{count}, a session expects exactly one")]
    RepeatedRequest { count: usize },

    #[error("Failed to render response: {reason}")]
    Render { reason: String },
}

/// Outcome of validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    failures: Vec<ValidationFailure>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    pub fn push(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }

    pub fn into_failures(self) -> Vec<ValidationFailure> {
        self.failures
    }
}

/// Parameters extracted from a validated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    pub owner: String,
    /// Repository name (absent for the owner listing)
    pub name: Option<String>,
}

/// Compiled description of one endpoint family.
pub struct EndpointDescriptor {
    family: EndpointFamily,
    pattern: Result<Regex, regex::Error>,
    canonical: Vec<String>,
    shape: String,
}

impl EndpointDescriptor {
    fn new(
        family: EndpointFamily,
        pattern: &str,
        canonical: Vec<String>,
        shape: String,
    ) -> Self {
        Self {
            family,
            pattern: Regex::new(pattern),
            canonical,
            shape,
        }
    }

    pub fn family(&self) -> EndpointFamily {
        self.family
    }

    /// Human readable path shape, e.g. `/repos/{owner}/{repo}`.
    pub fn shape(&self) -> &str {
        &self.shape
    }

    fn is_match(&self, path: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|regex| regex.is_match(path))
            .unwrap_or(false)
    }

    fn validate_path(&self, path: &str, validation: &mut Validation) {
        let regex = match &self.pattern {
            Ok(regex) => regex,
            Err(e) => {
                validation.push(ValidationFailure::InvalidPattern {
                    family: self.family,
                    reason: e.to_string(),
                });
                return;
            }
        };

        for sample in &self.canonical {
            if !regex.is_match(sample) {
                validation.push(ValidationFailure::RegexSelfCheck {
                    family: self.family,
                    sample: sample.clone(),
                });
            }
        }

        if !regex.is_match(path) {
            validation.push(ValidationFailure::ShapeMismatch {
                path: path.to_string(),
                expected: self.shape.clone(),
            });
        }
    }
}

/// Request matcher over the three endpoint families.
pub struct RequestMatcher {
    descriptors: Vec<EndpointDescriptor>,
    accept: Result<Regex, regex::Error>,
    resource: String,
    users: String,
    releases: String,
}

impl RequestMatcher {
    /// Build the matcher from the configured vocabulary.
    pub fn new(endpoints: &EndpointSettings) -> Self {
        let resource = regex::escape(&endpoints.resource);
        let users = regex::escape(&endpoints.users);
        let releases = regex::escape(&endpoints.releases);
        let r = &endpoints.resource;

        let descriptors = vec![
            EndpointDescriptor::new(
                EndpointFamily::Repository,
                &format!("^/{}(/[^/]+){{0,2}}$", resource),
                vec![format!("/{}", r), format!("/{}/user", r), format!("/{}/user/foo", r)],
                format!("/{}/{{owner}}/{{repo}}", r),
            ),
            EndpointDescriptor::new(
                EndpointFamily::RepositoryList,
                &format!("^/{}/[^/]+/{}$", users, resource),
                vec![format!("/{}/user/{}", endpoints.users, r)],
                format!("/{}/{{user}}/{}", endpoints.users, r),
            ),
            EndpointDescriptor::new(
                EndpointFamily::ReleaseList,
                &format!("^/{}(/[^/]+){{2}}/{}$", resource, releases),
                vec![format!("/{}/user/foo/{}", r, endpoints.releases)],
                format!("/{}/{{owner}}/{{repo}}/{}", r, endpoints.releases),
            ),
        ];

        Self {
            descriptors,
            accept: Regex::new(&endpoints.accept_pattern),
            resource: endpoints.resource.clone(),
            users: endpoints.users.clone(),
            releases: endpoints.releases.clone(),
        }
    }

    pub fn descriptor(&self, family: EndpointFamily) -> &EndpointDescriptor {
        &self.descriptors[family.index()]
    }

    /// Validate a request against one family.
    pub fn validate(
        &self,
        family: EndpointFamily,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Validation {
        let mut validation = Validation::default();

        self.descriptor(family).validate_path(path, &mut validation);

        let accept = find_header(headers, "accept");
        let acceptable = match (&self.accept, accept) {
            (Ok(regex), Some(value)) => regex.is_match(value),
            _ => false,
        };
        if !acceptable {
            validation.push(ValidationFailure::NotAcceptable {
                accept: accept.cloned(),
            });
        }

        if !method.eq_ignore_ascii_case("GET") {
            validation.push(ValidationFailure::MethodNotAllowed {
                method: method.to_string(),
            });
        }

        validation
    }

    /// Find the family whose path shape matches.
    pub fn identify(&self, path: &str) -> Option<EndpointFamily> {
        [
            EndpointFamily::ReleaseList,
            EndpointFamily::RepositoryList,
            EndpointFamily::Repository,
        ]
        .into_iter()
        .find(|family| self.descriptor(*family).is_match(path))
    }

    /// Extract the owner (and repository name) from a path.
    ///
    /// Parameters are counted from the end of the path after dropping the
    /// family's literal suffix, so `/repos/o/r/releases` yields `o` and `r`.
    pub fn extract(
        &self,
        family: EndpointFamily,
        path: &str,
    ) -> Result<PathParams, ValidationFailure> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let end = segments.len().saturating_sub(family.suffix_len());
        // Skip the leading literal (`repos` or `users`)
        let params = segments.get(1..end).unwrap_or(&[]);

        let arity = family.arity();
        if params.len() < arity {
            return Err(ValidationFailure::MissingParameters {
                path: path.to_string(),
                expected: arity,
            });
        }

        let params = &params[params.len() - arity..];
        Ok(PathParams {
            owner: decode_segment(params[0]),
            name: params.get(1).map(|s| decode_segment(s)),
        })
    }

    /// Request path for a family, as a client would build it.
    pub fn path_for(&self, family: EndpointFamily, owner: &str, name: &str) -> String {
        match family {
            EndpointFamily::Repository => format!("/{}/{}/{}", self.resource, owner, name),
            EndpointFamily::RepositoryList => format!("/{}/{}/{}", self.users, owner, self.resource),
            EndpointFamily::ReleaseList => {
                format!("/{}/{}/{}/{}", self.resource, owner, name, self.releases)
            }
        }
    }

    #[cfg(test)]
    fn with_pattern(mut self, family: EndpointFamily, pattern: &str) -> Self {
        self.descriptors[family.index()].pattern = Regex::new(pattern);
        self
    }
}

/// Case-insensitive header lookup.
fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Percent-decode a path segment, keeping it as sent when it is not UTF-8
fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}
