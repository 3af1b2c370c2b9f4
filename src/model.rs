//! Client-side view of the emulated API's records.

use crate::template::{ReleaseFields, RepositoryFields};
use serde::{Deserialize, Serialize};

/// Account owning a repository or authoring a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub name: String,
    pub tag_name: String,
    pub author: User,
}

impl From<&RepositoryFields> for Repository {
    fn from(fields: &RepositoryFields) -> Self {
        Self {
            id: fields.id,
            name: fields.name.clone(),
            full_name: fields.full_name.clone(),
            owner: User {
                login: fields.owner.clone(),
                id: fields.owner_id,
            },
        }
    }
}

impl From<&ReleaseFields> for Release {
    fn from(fields: &ReleaseFields) -> Self {
        Self {
            id: fields.id,
            name: fields.name.clone(),
            tag_name: fields.tag.clone(),
            author: User {
                login: fields.author.clone(),
                id: fields.author_id,
            },
        }
    }
}
