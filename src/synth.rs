//! Response synthesis.
//!
//! Fills the record templates with path parameters and catalog data and
//! assembles single records or JSON arrays.

use crate::config::Catalog;
use crate::matcher::{EndpointFamily, PathParams};
use crate::template::{ReleaseFields, RepositoryFields, TemplateError, TemplateStore};
use std::sync::Arc;

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

const INDENT: &str = "    ";

/// A response ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub status: u16,
    pub body: String,
}

impl RenderedResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    /// Empty but well-formed body for a family, used when rendering fails.
    pub fn fallback(family: EndpointFamily) -> Self {
        match family {
            EndpointFamily::Repository => Self::ok("{}".to_string()),
            EndpointFamily::RepositoryList | EndpointFamily::ReleaseList => {
                Self::ok("[]".to_string())
            }
        }
    }
}

/// Renders response bodies from a template store and a catalog.
pub struct Synthesizer {
    templates: Arc<TemplateStore>,
    catalog: Catalog,
}

impl Synthesizer {
    pub fn new(templates: Arc<TemplateStore>, catalog: Catalog) -> Self {
        Self { templates, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Render the body for a family from extracted path parameters.
    pub fn render(
        &self,
        family: EndpointFamily,
        params: &PathParams,
    ) -> Result<RenderedResponse, TemplateError> {
        let name = params.name.as_deref().unwrap_or_default();
        match family {
            EndpointFamily::Repository => self.repository(&params.owner, name),
            EndpointFamily::RepositoryList => self.repository_list(&params.owner),
            EndpointFamily::ReleaseList => self.release_list(&params.owner),
        }
    }

    /// A single repository record with id 1.
    pub fn repository(&self, owner: &str, name: &str) -> Result<RenderedResponse, TemplateError> {
        let body = self
            .templates
            .render_repository(&RepositoryFields::new(1, owner, name))?;
        Ok(RenderedResponse::ok(body))
    }

    /// One record per catalog repository, ids counting up from 1.
    pub fn repository_list(&self, owner: &str) -> Result<RenderedResponse, TemplateError> {
        let blocks = self
            .catalog
            .repositories
            .iter()
            .zip(1..)
            .map(|(name, id)| {
                self.templates
                    .render_repository(&RepositoryFields::new(id, owner, name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderedResponse::ok(json_array(&blocks)))
    }

    /// One record per release tier, least mature first.
    pub fn release_list(&self, owner: &str) -> Result<RenderedResponse, TemplateError> {
        let blocks = self
            .catalog
            .releases_by_maturity()
            .iter()
            .zip(1..)
            .map(|(tier, id)| {
                self.templates
                    .render_release(&ReleaseFields::new(id, &tier.name, &tier.tag, owner))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderedResponse::ok(json_array(&blocks)))
    }
}

/// Join rendered records into an array, each block indented one level.
fn json_array(blocks: &[String]) -> String {
    let items: Vec<String> = blocks.iter().map(|block| indent(block)).collect();
    format!("[\n{}{}\n]", INDENT, items.join(&format!(",\n{}", INDENT)))
}

fn indent(block: &str) -> String {
    block.replace('\n', &format!("\n{}", INDENT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Maturity, ReleaseTier};
    use serde_json::Value;

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(Arc::new(TemplateStore::builtin().unwrap()), Catalog::default())
    }

    fn parse(response: &RenderedResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_single_repository() {
        let response = synthesizer().repository("octocat", "Hello-World").unwrap();
        assert_eq!(response.status, 200);

        let json = parse(&response);
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "Hello-World");
        assert_eq!(json["full_name"], "octocat/Hello-World");
        assert_eq!(json["owner"]["login"], "octocat");
    }

    #[test]
    fn test_repository_list() {
        let response = synthesizer().repository_list("mattermost").unwrap();
        let json = parse(&response);
        let items = json.as_array().unwrap();

        assert_eq!(items.len(), 12);
        assert_eq!(items[0]["owner"]["login"], "mattermost");
        assert_eq!(items[0]["name"], "mattermost-plugin-github");
        assert_eq!(items[11]["name"], "mattermost-plugin-webex");
        for (idx, item) in items.iter().enumerate() {
            assert_eq!(item["id"], (idx + 1) as u64);
            assert_eq!(
                item["full_name"],
                format!("mattermost/{}", item["name"].as_str().unwrap())
            );
        }
    }

    #[test]
    fn test_release_list() {
        let response = synthesizer().release_list("mattermost").unwrap();
        let json = parse(&response);
        let items = json.as_array().unwrap();

        assert_eq!(items.len(), 3);
        let last = &items[2];
        assert_eq!(last["name"], "stable");
        assert_eq!(last["tag_name"], "v1.0.0");
        assert_eq!(last["id"], 3);
        assert!(items.iter().all(|r| r["author"]["login"] == "mattermost"));
    }

    #[test]
    fn test_release_list_sorted_by_maturity() {
        let catalog = Catalog {
            repositories: vec!["one".to_string()],
            releases: vec![
                ReleaseTier::new("stable", "v1.0.0", Maturity::Stable),
                ReleaseTier::new("alpha", "v0.1.0", Maturity::Unstable),
                ReleaseTier::new("beta", "v0.9.0", Maturity::Beta),
            ],
        };
        let synth = Synthesizer::new(Arc::new(TemplateStore::builtin().unwrap()), catalog);

        let json = parse(&synth.release_list("me").unwrap());
        let names: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "stable"]);
    }

    #[test]
    fn test_array_layout() {
        let response = synthesizer().release_list("me").unwrap();
        assert!(response.body.starts_with("[\n    {\n        \"id\": 1,"));
        assert!(response.body.ends_with("\n    }\n]"));
        assert!(response.body.contains("\n    },\n    {\n        \"id\": 2,"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = synthesizer().repository_list("octocat").unwrap();
        let b = synthesizer().repository_list("octocat").unwrap();
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_render_dispatch() {
        let synth = synthesizer();
        let params = PathParams {
            owner: "o".to_string(),
            name: Some("r".to_string()),
        };
        assert_eq!(
            synth.render(EndpointFamily::Repository, &params).unwrap(),
            synth.repository("o", "r").unwrap()
        );
        assert_eq!(
            synth.render(EndpointFamily::ReleaseList, &params).unwrap(),
            synth.release_list("o").unwrap()
        );
    }

    #[test]
    fn test_positional_templates_produce_same_records() {
        let positional = Synthesizer::new(
            Arc::new(TemplateStore::builtin_positional().unwrap()),
            Catalog::default(),
        );
        let json = parse(&positional.repository_list("mattermost").unwrap());
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 12);
        assert_eq!(items[3]["id"], 4);
        assert_eq!(items[3]["full_name"], "mattermost/mattermost-plugin-jira");
    }

    #[test]
    fn test_fallback_bodies_are_json() {
        for family in EndpointFamily::ALL {
            let response = RenderedResponse::fallback(family);
            assert_eq!(response.status, 200);
            serde_json::from_str::<Value>(&response.body).unwrap();
        }
    }
}
