//! Record templates.
//!
//! A `TemplateStore` renders one repository record or one release record.
//! Templates are either Handlebars with named fields or printf-style text
//! consuming an ordered argument list (`%d`, `%s`, `%v`).

use crate::config::{TemplateSettings, TemplateSource, TemplateSyntax};
use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

const REPOSITORY_TEMPLATE: &str = include_str!("../templates/repository.json.hbs");
const RELEASE_TEMPLATE: &str = include_str!("../templates/release.json.hbs");
const REPOSITORY_FORMAT: &str = include_str!("../templates/repository_format.json");
const RELEASE_FORMAT: &str = include_str!("../templates/release_format.json");

const REPOSITORY: &str = "repository";
const RELEASE: &str = "release";

/// Errors raised while loading or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid {name} template: {source}")]
    Parse {
        name: &'static str,
        source: handlebars::TemplateError,
    },

    #[error("Failed to render {name} template: {source}")]
    Render {
        name: &'static str,
        source: handlebars::RenderError,
    },

    #[error("Failed to read {name} template: {source}")]
    Io {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("Unknown verb %{verb} in {name} template")]
    UnknownVerb { name: &'static str, verb: char },

    #[error("The {name} template takes {expected} arguments, {supplied} supplied")]
    ArgumentCount {
        name: &'static str,
        expected: usize,
        supplied: usize,
    },

    #[error("Argument {index} does not fit %{verb} in {name} template")]
    VerbMismatch {
        name: &'static str,
        index: usize,
        verb: char,
    },

    #[error("The {name} template does not render valid JSON: {source}")]
    InvalidJson {
        name: &'static str,
        source: serde_json::Error,
    },
}

/// One ordered argument of a positional template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Int(u64),
    Str(String),
}

/// Fields of one repository record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryFields {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub owner_id: u64,
    pub count: u64,
}

impl RepositoryFields {
    /// Fields for `owner/name` with the given sequence id.
    pub fn new(id: u64, owner: &str, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            owner: owner.to_string(),
            owner_id: 1,
            count: 1,
        }
    }

    /// Arguments in positional order: id, name, full name, owner, owner id,
    /// owner, count.
    pub fn positional(&self) -> Vec<TemplateValue> {
        vec![
            TemplateValue::Int(self.id),
            TemplateValue::Str(self.name.clone()),
            TemplateValue::Str(self.full_name.clone()),
            TemplateValue::Str(self.owner.clone()),
            TemplateValue::Int(self.owner_id),
            TemplateValue::Str(self.owner.clone()),
            TemplateValue::Int(self.count),
        ]
    }
}

/// Fields of one release record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFields {
    pub id: u64,
    pub name: String,
    pub tag: String,
    pub author: String,
    pub author_id: u64,
}

impl ReleaseFields {
    pub fn new(id: u64, name: &str, tag: &str, author: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            tag: tag.to_string(),
            author: author.to_string(),
            author_id: 1,
        }
    }

    /// Arguments in positional order: id, name, tag, author, author id.
    pub fn positional(&self) -> Vec<TemplateValue> {
        vec![
            TemplateValue::Int(self.id),
            TemplateValue::Str(self.name.clone()),
            TemplateValue::Str(self.tag.clone()),
            TemplateValue::Str(self.author.clone()),
            TemplateValue::Int(self.author_id),
        ]
    }
}

/// Read-only holder of the two record templates.
pub struct TemplateStore {
    syntax: TemplateSyntax,
    engine: Engine,
}

enum Engine {
    Named(Box<Handlebars<'static>>),
    Positional {
        repository: PositionalTemplate,
        release: PositionalTemplate,
    },
}

impl TemplateStore {
    /// Built-in Handlebars templates.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::named(REPOSITORY_TEMPLATE, RELEASE_TEMPLATE)
    }

    /// Built-in printf-style templates.
    pub fn builtin_positional() -> Result<Self, TemplateError> {
        Self::positional(REPOSITORY_FORMAT, RELEASE_FORMAT)
    }

    /// Build a store from configured template settings.
    pub fn from_settings(settings: &TemplateSettings) -> Result<Self, TemplateError> {
        match settings.syntax {
            TemplateSyntax::Named => Self::named(
                &load_source(REPOSITORY, settings.repository.as_ref(), REPOSITORY_TEMPLATE)?,
                &load_source(RELEASE, settings.release.as_ref(), RELEASE_TEMPLATE)?,
            ),
            TemplateSyntax::Positional => Self::positional(
                &load_source(REPOSITORY, settings.repository.as_ref(), REPOSITORY_FORMAT)?,
                &load_source(RELEASE, settings.release.as_ref(), RELEASE_FORMAT)?,
            ),
        }
    }

    /// Handlebars templates with named fields.
    pub fn named(repository: &str, release: &str) -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Output lands inside JSON string literals, not HTML
        handlebars.register_escape_fn(json_escape);
        handlebars
            .register_template_string(REPOSITORY, repository)
            .map_err(|source| TemplateError::Parse {
                name: REPOSITORY,
                source,
            })?;
        handlebars
            .register_template_string(RELEASE, release)
            .map_err(|source| TemplateError::Parse {
                name: RELEASE,
                source,
            })?;

        let store = Self {
            syntax: TemplateSyntax::Named,
            engine: Engine::Named(Box::new(handlebars)),
        };
        store.check()?;
        Ok(store)
    }

    /// Printf-style templates consuming ordered arguments.
    pub fn positional(repository: &str, release: &str) -> Result<Self, TemplateError> {
        let store = Self {
            syntax: TemplateSyntax::Positional,
            engine: Engine::Positional {
                repository: PositionalTemplate::parse(REPOSITORY, repository)?,
                release: PositionalTemplate::parse(RELEASE, release)?,
            },
        };
        store.check()?;
        Ok(store)
    }

    pub fn syntax(&self) -> TemplateSyntax {
        self.syntax
    }

    /// Render one repository record.
    pub fn render_repository(&self, fields: &RepositoryFields) -> Result<String, TemplateError> {
        let rendered = match &self.engine {
            Engine::Named(handlebars) => {
                handlebars
                    .render(REPOSITORY, fields)
                    .map_err(|source| TemplateError::Render {
                        name: REPOSITORY,
                        source,
                    })?
            }
            Engine::Positional { repository, .. } => repository.render(&fields.positional())?,
        };
        Ok(rendered.trim_end().to_string())
    }

    /// Render one release record.
    pub fn render_release(&self, fields: &ReleaseFields) -> Result<String, TemplateError> {
        let rendered = match &self.engine {
            Engine::Named(handlebars) => {
                handlebars
                    .render(RELEASE, fields)
                    .map_err(|source| TemplateError::Render {
                        name: RELEASE,
                        source,
                    })?
            }
            Engine::Positional { release, .. } => release.render(&fields.positional())?,
        };
        Ok(rendered.trim_end().to_string())
    }

    /// Render both templates once with sample fields and parse the output.
    fn check(&self) -> Result<(), TemplateError> {
        let repository = self.render_repository(&RepositoryFields::new(1, "owner", "name"))?;
        serde_json::from_str::<serde_json::Value>(&repository).map_err(|source| {
            TemplateError::InvalidJson {
                name: REPOSITORY,
                source,
            }
        })?;

        let release = self.render_release(&ReleaseFields::new(1, "stable", "v1.0.0", "owner"))?;
        serde_json::from_str::<serde_json::Value>(&release).map_err(|source| {
            TemplateError::InvalidJson {
                name: RELEASE,
                source,
            }
        })?;
        Ok(())
    }
}

fn load_source(
    name: &'static str,
    source: Option<&TemplateSource>,
    builtin: &str,
) -> Result<String, TemplateError> {
    match source {
        Some(source) => source
            .load()
            .map_err(|source| TemplateError::Io { name, source }),
        None => Ok(builtin.to_string()),
    }
}

/// Escape text for use inside a JSON string literal.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Template text split into literals and printf verbs.
struct PositionalTemplate {
    name: &'static str,
    pieces: Vec<Piece>,
}

enum Piece {
    Literal(String),
    Verb(char),
}

impl PositionalTemplate {
    fn parse(name: &'static str, source: &str) -> Result<Self, TemplateError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(ch) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue;
            }
            match chars.next() {
                Some('%') => literal.push('%'),
                Some(verb @ ('d' | 's' | 'v')) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Verb(verb));
                }
                Some(verb) => return Err(TemplateError::UnknownVerb { name, verb }),
                // Dangling percent at end of input
                None => literal.push('%'),
            }
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self { name, pieces })
    }

    fn arity(&self) -> usize {
        self.pieces
            .iter()
            .filter(|piece| matches!(piece, Piece::Verb(_)))
            .count()
    }

    fn render(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(TemplateError::ArgumentCount {
                name: self.name,
                expected,
                supplied: args.len(),
            });
        }

        let mut out = String::new();
        let mut index = 0;
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Verb(verb) => {
                    match (verb, &args[index]) {
                        ('d' | 'v', TemplateValue::Int(n)) => out.push_str(&n.to_string()),
                        ('s' | 'v', TemplateValue::Str(s)) => out.push_str(&json_escape(s)),
                        _ => {
                            return Err(TemplateError::VerbMismatch {
                                name: self.name,
                                index,
                                verb: *verb,
                            })
                        }
                    }
                    index += 1;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_builtin_repository() {
        let store = TemplateStore::builtin().unwrap();
        let fields = RepositoryFields::new(7, "octocat", "Hello-World");

        let json = parse(&store.render_repository(&fields).unwrap());
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Hello-World");
        assert_eq!(json["full_name"], "octocat/Hello-World");
        assert_eq!(json["owner"]["login"], "octocat");
        assert_eq!(json["owner"]["id"], 1);
    }

    #[test]
    fn test_builtin_release() {
        let store = TemplateStore::builtin().unwrap();
        let fields = ReleaseFields::new(3, "stable", "v1.0.0", "mattermost");

        let json = parse(&store.render_release(&fields).unwrap());
        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "stable");
        assert_eq!(json["tag_name"], "v1.0.0");
        assert_eq!(json["author"]["login"], "mattermost");
    }

    #[test]
    fn test_positional_matches_named_fields() {
        let named = TemplateStore::builtin().unwrap();
        let positional = TemplateStore::builtin_positional().unwrap();
        assert_eq!(positional.syntax(), TemplateSyntax::Positional);

        let fields = RepositoryFields::new(2, "mattermost", "mattermost-plugin-jira");
        let a = parse(&named.render_repository(&fields).unwrap());
        let b = parse(&positional.render_repository(&fields).unwrap());
        for key in ["id", "name", "full_name"] {
            assert_eq!(a[key], b[key], "field {}", key);
        }
        assert_eq!(a["owner"]["login"], b["owner"]["login"]);
        assert_eq!(a["owner"]["id"], b["owner"]["id"]);
    }

    #[test]
    fn test_rendered_block_has_no_trailing_newline() {
        let store = TemplateStore::builtin().unwrap();
        let text = store
            .render_repository(&RepositoryFields::new(1, "a", "b"))
            .unwrap();
        assert!(text.ends_with('}'));
    }

    #[test]
    fn test_names_are_escaped() {
        let store = TemplateStore::builtin().unwrap();
        let fields = RepositoryFields::new(1, "o\"wner", "na\\me");
        let json = parse(&store.render_repository(&fields).unwrap());
        assert_eq!(json["owner"]["login"], "o\"wner");
        assert_eq!(json["name"], "na\\me");
    }

    #[test]
    fn test_positional_argument_count_is_checked() {
        // Six verbs for a seven-argument contract
        let repository = r#"{"id": %d, "name": "%s", "full_name": "%s", "login": "%s", "owner_id": %d, "url": "%s"}"#;
        let err = TemplateStore::positional(repository, RELEASE_FORMAT)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TemplateError::ArgumentCount {
                expected: 6,
                supplied: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_positional_verb_mismatch() {
        // Name and id swapped
        let release = r#"{"name": "%s", "id": %d, "tag_name": "%s", "login": "%s", "author_id": %d}"#;
        let err = TemplateStore::positional(REPOSITORY_FORMAT, release)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TemplateError::VerbMismatch { index: 0, verb: 's', .. }
        ));
    }

    #[test]
    fn test_positional_unknown_verb() {
        let err = PositionalTemplate::parse(RELEASE, "%x").err().unwrap();
        assert!(matches!(err, TemplateError::UnknownVerb { verb: 'x', .. }));
    }

    #[test]
    fn test_positional_percent_literal() {
        let template = PositionalTemplate::parse(RELEASE, "%d%% of %s").unwrap();
        let out = template
            .render(&[TemplateValue::Int(50), TemplateValue::Str("tests".to_string())])
            .unwrap();
        assert_eq!(out, "50% of tests");
    }

    #[test]
    fn test_named_template_must_render_json() {
        let err = TemplateStore::named("{\"id\": {{id}}", RELEASE_TEMPLATE)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TemplateError::InvalidJson {
                name: "repository",
                ..
            }
        ));
    }

    #[test]
    fn test_named_template_unknown_field() {
        let err = TemplateStore::named(REPOSITORY_TEMPLATE, "{\"stars\": {{stars}}}")
            .err()
            .unwrap();
        assert!(matches!(err, TemplateError::Render { name: "release", .. }));
    }

    #[test]
    fn test_from_settings_inline() {
        let settings = TemplateSettings {
            syntax: TemplateSyntax::Named,
            repository: None,
            release: Some(TemplateSource::Inline {
                content: r#"{"id": {{id}}, "name": "{{name}}", "tag_name": "{{tag}}", "author": {"login": "{{author}}", "id": {{author_id}}}}"#.to_string(),
            }),
        };
        let store = TemplateStore::from_settings(&settings).unwrap();
        let json = parse(
            &store
                .render_release(&ReleaseFields::new(1, "beta", "v0.9.0", "me"))
                .unwrap(),
        );
        assert_eq!(json["tag_name"], "v0.9.0");
    }

    #[test]
    fn test_from_settings_missing_file() {
        let settings = TemplateSettings {
            syntax: TemplateSyntax::Positional,
            repository: Some(TemplateSource::File {
                path: "/nonexistent/repository_format.json".into(),
            }),
            release: None,
        };
        let err = TemplateStore::from_settings(&settings).err().unwrap();
        assert!(matches!(err, TemplateError::Io { name: "repository", .. }));
    }
}
