//! Configuration for the GitHub API mock.
//!
//! Defines the endpoint vocabulary, the sample catalogs, template selection
//! and logging settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the mock.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Path vocabulary and content negotiation
    #[serde(default)]
    pub endpoints: EndpointSettings,

    /// Sample data rendered into list responses
    #[serde(default)]
    pub catalog: Catalog,

    /// Template selection
    #[serde(default)]
    pub templates: TemplateSettings,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.endpoints
            .validate()
            .map_err(|e| anyhow::anyhow!("endpoints: {}", e))?;
        self.catalog
            .validate()
            .map_err(|e| anyhow::anyhow!("catalog: {}", e))?;
        Ok(())
    }
}

/// Path vocabulary of the emulated API.
///
/// With the defaults the three families are `/repos/{owner}/{repo}`,
/// `/users/{owner}/repos` and `/repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSettings {
    /// Resource segment (`repos`)
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Owner listing segment (`users`)
    #[serde(default = "default_users")]
    pub users: String,

    /// Sub-resource segment (`releases`)
    #[serde(default = "default_releases")]
    pub releases: String,

    /// Regex an `Accept` header must match
    #[serde(default = "default_accept_pattern")]
    pub accept_pattern: String,

    /// `Accept` value sent by the session client
    #[serde(default = "default_client_accept")]
    pub client_accept: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            users: default_users(),
            releases: default_releases(),
            accept_pattern: default_accept_pattern(),
            client_accept: default_client_accept(),
        }
    }
}

impl EndpointSettings {
    /// Validate the endpoint vocabulary.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, segment) in [
            ("resource", &self.resource),
            ("users", &self.users),
            ("releases", &self.releases),
        ] {
            if segment.is_empty() || segment.contains('/') {
                anyhow::bail!("{} must be a single non-empty path segment", field);
            }
        }
        let accept = regex::Regex::new(&self.accept_pattern)
            .map_err(|e| anyhow::anyhow!("Invalid accept_pattern: {}", e))?;
        if !accept.is_match(&self.client_accept) {
            anyhow::bail!(
                "client_accept {:?} does not satisfy accept_pattern",
                self.client_accept
            );
        }
        Ok(())
    }
}

fn default_resource() -> String {
    "repos".to_string()
}

fn default_users() -> String {
    "users".to_string()
}

fn default_releases() -> String {
    "releases".to_string()
}

fn default_accept_pattern() -> String {
    r"application/[^\s,;]+\+json(?:[\s,;]|$)".to_string()
}

fn default_client_accept() -> String {
    "application/vnd.github.v3+json".to_string()
}

/// Fixed sample data used by the list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Repository names rendered by the owner listing, in order
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,

    /// Release tiers rendered by the release listing
    #[serde(default = "default_release_tiers")]
    pub releases: Vec<ReleaseTier>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            repositories: default_repositories(),
            releases: default_release_tiers(),
        }
    }
}

impl Catalog {
    /// Validate the catalog.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.repositories.is_empty() {
            anyhow::bail!("repositories cannot be empty");
        }
        if self.repositories.iter().any(|name| name.is_empty()) {
            anyhow::bail!("repository names cannot be empty");
        }
        if self.releases.is_empty() {
            anyhow::bail!("releases cannot be empty");
        }
        for tier in &self.releases {
            if tier.name.is_empty() || tier.tag.is_empty() {
                anyhow::bail!("release tiers need a name and a tag");
            }
        }
        Ok(())
    }

    /// Release tiers ordered from least to most mature.
    ///
    /// The sort is stable, so tiers sharing a maturity keep their
    /// configured order.
    pub fn releases_by_maturity(&self) -> Vec<ReleaseTier> {
        let mut tiers = self.releases.clone();
        tiers.sort_by_key(|tier| tier.maturity);
        tiers
    }

    /// The tier a release listing ends with.
    pub fn most_mature_release(&self) -> Option<ReleaseTier> {
        self.releases_by_maturity().pop()
    }
}

fn default_repositories() -> Vec<String> {
    [
        "mattermost-plugin-github",
        "mattermost-plugin-autolink",
        "mattermost-plugin-zoom",
        "mattermost-plugin-jira",
        "mattermost-plugin-welcomebot",
        "mattermost-plugin-jenkins",
        "mattermost-plugin-antivirus",
        "mattermost-plugin-custom-attributes",
        "mattermost-plugin-aws-SNS",
        "mattermost-plugin-gitlab",
        "mattermost-plugin-nps",
        "mattermost-plugin-webex",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_release_tiers() -> Vec<ReleaseTier> {
    vec![
        ReleaseTier::new("alpha", "v0.1.0", Maturity::Unstable),
        ReleaseTier::new("beta", "v0.9.0", Maturity::Beta),
        ReleaseTier::new("stable", "v1.0.0", Maturity::Stable),
    ]
}

/// One entry of the release catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseTier {
    /// Release name
    pub name: String,
    /// Tag name
    pub tag: String,
    /// Maturity used for ordering
    #[serde(default)]
    pub maturity: Maturity,
}

impl ReleaseTier {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, maturity: Maturity) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            maturity,
        }
    }
}

/// Release classification, ordered least to most mature.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    Unstable,
    Beta,
    #[default]
    Stable,
}

/// Template selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TemplateSettings {
    /// Placeholder syntax used by the templates
    #[serde(default)]
    pub syntax: TemplateSyntax,

    /// Repository record template (built-in when absent)
    #[serde(default)]
    pub repository: Option<TemplateSource>,

    /// Release record template (built-in when absent)
    #[serde(default)]
    pub release: Option<TemplateSource>,
}

/// Placeholder syntax of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSyntax {
    /// Handlebars with named fields (`{{full_name}}`)
    #[default]
    Named,
    /// Ordered printf-style verbs (`%d`, `%s`, `%v`)
    Positional,
}

/// Where a template's text comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateSource {
    /// Template text given in the configuration
    Inline { content: String },
    /// Load from file
    File { path: PathBuf },
}

impl TemplateSource {
    /// Get the template text.
    pub fn load(&self) -> std::io::Result<String> {
        match self {
            TemplateSource::Inline { content } => Ok(content.clone()),
            TemplateSource::File { path } => std::fs::read_to_string(path),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log every matched request
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log validation failures
    #[serde(default = "default_true")]
    pub log_failures: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_failures: true,
        }
    }
}

fn default_true() -> bool {
    true
}
