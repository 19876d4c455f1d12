//! Named list references and their lookup.

use crate::config::NewsletterConfig;
use crate::error::{NewsletterError, Result};

/// A human-readable list name mapped to the provider's list id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterList {
    name: String,
    id: String,
}

impl NewsletterList {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Ordered collection of configured lists plus the name of the default one.
///
/// Names are unique. The default list is only resolved on lookup, so a
/// collection whose default name matches nothing can still serve explicit
/// names.
#[derive(Debug, Clone)]
pub struct NewsletterListCollection {
    lists: Vec<NewsletterList>,
    default_list_name: String,
}

impl NewsletterListCollection {
    pub fn new(
        lists: Vec<NewsletterList>,
        default_list_name: impl Into<String>,
    ) -> Result<Self> {
        for (i, list) in lists.iter().enumerate() {
            if lists[..i].iter().any(|other| other.name == list.name) {
                return Err(NewsletterError::DuplicateList(list.name.clone()));
            }
        }
        Ok(Self {
            lists,
            default_list_name: default_list_name.into(),
        })
    }

    pub fn from_config(config: &NewsletterConfig) -> Result<Self> {
        let lists = config
            .lists
            .iter()
            .map(|l| NewsletterList::new(&l.name, &l.id))
            .collect();
        Self::new(lists, &config.default_list_name)
    }

    /// Resolve a list by name. `None` and the empty name mean the default list.
    pub fn find_by_name(&self, name: Option<&str>) -> Result<&NewsletterList> {
        match name {
            None | Some("") => self.default_list(),
            Some(name) => self
                .lists
                .iter()
                .find(|list| list.name == name)
                .ok_or_else(|| NewsletterError::UnknownList(name.to_string())),
        }
    }

    pub fn default_list(&self) -> Result<&NewsletterList> {
        self.lists
            .iter()
            .find(|list| list.name == self.default_list_name)
            .ok_or_else(|| NewsletterError::DefaultListMissing(self.default_list_name.clone()))
    }

    pub fn default_list_name(&self) -> &str {
        &self.default_list_name
    }

    pub fn iter(&self) -> impl Iterator<Item = &NewsletterList> {
        self.lists.iter()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
