mod data;
pub mod debounce;
pub mod view;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "web")]
pub mod web;

pub use data::{CategoryTag, EntityDetail, EntitySummary};
pub use view::{PageResetPolicy, PageView, ViewConfig, ViewState};

#[cfg(feature = "client")]
use client::FetchError;

/// Tag vocabulary as far as it could be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagVocabulary {
    Available(Vec<CategoryTag>),
    /// The tag fetch failed; filtering by tag is disabled.
    Unavailable(String),
}

/// Everything a session displays: the enriched entities and the tag menu.
#[derive(Debug, Clone)]
pub struct Catalog {
    entities: Vec<EntityDetail>,
    tags: TagVocabulary,
}

impl Catalog {
    pub fn from_parts(entities: Vec<EntityDetail>, tags: TagVocabulary) -> Self {
        Self { entities, tags }
    }

    #[cfg(feature = "client")]
    pub(crate) fn new(
        entities: Vec<EntityDetail>,
        tags: Result<Vec<CategoryTag>, FetchError>,
    ) -> Self {
        let tags = match tags {
            Ok(tags) => TagVocabulary::Available(tags),
            Err(err) => TagVocabulary::Unavailable(err.user_message().to_string()),
        };
        Self::from_parts(entities, tags)
    }

    pub fn entities(&self) -> &[EntityDetail] {
        &self.entities
    }

    pub fn tags(&self) -> Option<&[CategoryTag]> {
        match &self.tags {
            TagVocabulary::Available(tags) => Some(tags),
            TagVocabulary::Unavailable(_) => None,
        }
    }

    pub fn tag_warning(&self) -> Option<&str> {
        match &self.tags {
            TagVocabulary::Available(_) => None,
            TagVocabulary::Unavailable(message) => Some(message),
        }
    }

    /// Projects `state` onto the catalog.
    ///
    /// A selected tag is ignored while the vocabulary is unavailable, since the
    /// menu it came from cannot be shown.
    pub fn view<'a>(&'a self, state: &ViewState) -> PageView<'a> {
        if self.tags().is_none() && state.selected_tag().is_some() {
            return state.clone().set_tag("").project(&self.entities);
        }
        state.project(&self.entities)
    }
}
