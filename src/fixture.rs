//! In-memory fixtures.
//!
//! Builds the same records the HTTP round trip decodes, without starting a
//! listener. Field rules are shared with the synthesizer through
//! `RepositoryFields` and `ReleaseFields`.

use crate::config::ReleaseTier;
use crate::model::{Release, Repository};
use crate::template::{ReleaseFields, RepositoryFields};

/// A single repository `owner/name` with id 1.
pub fn repository(owner: &str, name: &str) -> Repository {
    Repository::from(&RepositoryFields::new(1, owner, name))
}

/// One repository per name, ids counting up from 1.
pub fn repository_list<S: AsRef<str>>(owner: &str, names: &[S]) -> Vec<Repository> {
    names
        .iter()
        .zip(1..)
        .map(|(name, id)| Repository::from(&RepositoryFields::new(id, owner, name.as_ref())))
        .collect()
}

/// One release per tier, least mature first, authored by `owner`.
pub fn release_list(owner: &str, tiers: &[ReleaseTier]) -> Vec<Release> {
    let mut tiers = tiers.to_vec();
    tiers.sort_by_key(|tier| tier.maturity);
    tiers
        .iter()
        .zip(1..)
        .map(|(tier, id)| Release::from(&ReleaseFields::new(id, &tier.name, &tier.tag, owner)))
        .collect()
}

/// One release per tag, named after the tag, in the given order.
pub fn release_list_from_tags<S: AsRef<str>>(owner: &str, tags: &[S]) -> Vec<Release> {
    tags.iter()
        .zip(1..)
        .map(|(tag, id)| {
            Release::from(&ReleaseFields::new(id, tag.as_ref(), tag.as_ref(), owner))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Catalog, Maturity};

    #[test]
    fn test_repository() {
        let repo = repository("octocat", "Hello-World");
        assert_eq!(repo.id, 1);
        assert_eq!(repo.full_name, "octocat/Hello-World");
        assert_eq!(repo.owner.login, "octocat");
        assert_eq!(repo.owner.id, 1);
    }

    #[test]
    fn test_repository_list_ids() {
        let repos = repository_list("mattermost", &["a", "b", "c"]);
        let ids: Vec<_> = repos.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(repos.iter().all(|r| r.owner.login == "mattermost"));
        assert_eq!(repos[2].full_name, "mattermost/c");
    }

    #[test]
    fn test_release_list_default_catalog() {
        let releases = release_list("mattermost", &Catalog::default().releases);
        assert_eq!(releases.len(), 3);
        let last = releases.last().unwrap();
        assert_eq!(last.name, "stable");
        assert_eq!(last.tag_name, "v1.0.0");
        assert_eq!(last.id, 3);
    }

    #[test]
    fn test_release_list_orders_by_maturity() {
        let tiers = vec![
            ReleaseTier::new("final", "v2.0.0", Maturity::Stable),
            ReleaseTier::new("rc", "v2.0.0-rc1", Maturity::Beta),
        ];
        let releases = release_list("me", &tiers);
        assert_eq!(releases[0].name, "rc");
        assert_eq!(releases[1].name, "final");
        assert_eq!(releases[1].id, 2);
    }

    #[test]
    fn test_release_list_from_tags() {
        let releases = release_list_from_tags("me", &["v1.0.0", "v1.1.0"]);
        assert_eq!(releases[1].name, "v1.1.0");
        assert_eq!(releases[1].tag_name, "v1.1.0");
        assert_eq!(releases[1].author.login, "me");
    }

    #[test]
    fn test_empty_inputs() {
        let names: [&str; 0] = [];
        assert!(repository_list("me", &names).is_empty());
        assert!(release_list("me", &[]).is_empty());
    }
}
