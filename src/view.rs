use crate::data::EntityDetail;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ITEMS_PER_PAGE: usize = 12;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What happens to the current page when the debounced term or tag changes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageResetPolicy {
    /// Jump back to page 1 on every effective filter change.
    #[default]
    ResetOnFilterChange,
    /// Keep the page number even if it now lies past the last page.
    Preserve,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    pub items_per_page: usize,
    pub debounce: Duration,
    pub reset_policy: PageResetPolicy,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            debounce: DEFAULT_DEBOUNCE,
            reset_policy: PageResetPolicy::default(),
        }
    }
}

/// User-facing view state. Reducers consume the value and return the next one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ViewState {
    search_term: String,
    debounced_term: String,
    selected_tag: Option<String>,
    current_page: usize,
    items_per_page: usize,
    reset_policy: PageResetPolicy,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(DEFAULT_ITEMS_PER_PAGE)
    }
}

impl ViewState {
    pub fn new(items_per_page: usize) -> Self {
        Self {
            search_term: String::new(),
            debounced_term: String::new(),
            selected_tag: None,
            current_page: 1,
            items_per_page: items_per_page.max(1),
            reset_policy: PageResetPolicy::default(),
        }
    }

    pub fn from_config(config: &ViewConfig) -> Self {
        Self::new(config.items_per_page).with_reset_policy(config.reset_policy)
    }

    pub fn with_reset_policy(mut self, policy: PageResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn debounced_term(&self) -> &str {
        &self.debounced_term
    }

    pub fn selected_tag(&self) -> Option<&str> {
        self.selected_tag.as_deref()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    /// Echo raw input. Filtering only follows once the term is debounced.
    pub fn set_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    pub fn set_debounced_term(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        if term != self.debounced_term {
            self.debounced_term = term;
            self.after_filter_change();
        }
        self
    }

    /// Selects a tag; an empty string means "All".
    pub fn set_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let tag = (!tag.trim().is_empty()).then(|| tag.trim().to_string());
        if tag != self.selected_tag {
            self.selected_tag = tag;
            self.after_filter_change();
        }
        self
    }

    pub fn next_page(mut self, total_pages: usize) -> Self {
        if self.current_page < total_pages {
            self.current_page += 1;
        }
        self
    }

    pub fn previous_page(mut self) -> Self {
        if self.current_page > 1 {
            self.current_page -= 1;
        }
        self
    }

    /// Jumps to `page`, clamped into `[1, total_pages]`.
    pub fn go_to_page(mut self, page: usize, total_pages: usize) -> Self {
        self.current_page = page.clamp(1, total_pages.max(1));
        self
    }

    fn after_filter_change(&mut self) {
        if self.reset_policy == PageResetPolicy::ResetOnFilterChange {
            self.current_page = 1;
        }
    }

    /// Runs filter and pagination over `entities` for the current state.
    pub fn project<'a>(&self, entities: &'a [EntityDetail]) -> PageView<'a> {
        let filtered = filter(entities, &self.debounced_term, self.selected_tag());
        let total_pages = total_pages(filtered.len(), self.items_per_page);
        let items = page_slice(&filtered, self.current_page, self.items_per_page).to_vec();
        PageView {
            query: self.debounced_term.clone(),
            tag: self.selected_tag.clone(),
            items_per_page: self.items_per_page,
            filtered_count: filtered.len(),
            current_page: self.current_page,
            total_pages,
            has_previous: self.current_page > 1,
            has_next: self.current_page < total_pages,
            items,
        }
    }
}

/// Case-insensitive substring match on the name, then exact tag membership.
pub fn filter<'a>(
    entities: &'a [EntityDetail],
    term: &str,
    tag: Option<&str>,
) -> Vec<&'a EntityDetail> {
    let needle = term.to_lowercase();
    entities
        .iter()
        .filter(|entity| needle.is_empty() || entity.name().to_lowercase().contains(&needle))
        .filter(|entity| tag.is_none_or(|tag| entity.has_tag(tag)))
        .collect()
}

/// `ceil(count / per_page)`, never less than 1.
pub fn total_pages(count: usize, per_page: usize) -> usize {
    count.div_ceil(per_page.max(1)).max(1)
}

/// The 1-based `page` of `items`; empty when the page is out of range.
pub fn page_slice<T>(items: &[T], page: usize, per_page: usize) -> &[T] {
    let per_page = per_page.max(1);
    let start = page.saturating_sub(1).saturating_mul(per_page);
    if page == 0 || start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(per_page).min(items.len());
    &items[start..end]
}

/// One rendered page of the catalog, along with the filters that produced it.
#[derive(Debug, Clone)]
pub struct PageView<'a> {
    pub query: String,
    pub tag: Option<String>,
    pub items_per_page: usize,
    pub items: Vec<&'a EntityDetail>,
    pub filtered_count: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageView<'_> {
    pub fn is_empty(&self) -> bool {
        self.filtered_count == 0
    }

    pub fn page_label(&self) -> String {
        format!("Page {} of {}", self.current_page, self.total_pages)
    }

    pub fn to_payload(&self) -> PagePayload {
        PagePayload {
            query: self.query.clone(),
            tag: self.tag.clone(),
            page: self.current_page,
            total_pages: self.total_pages,
            items_per_page: self.items_per_page,
            filtered_count: self.filtered_count,
            has_previous: self.has_previous,
            has_next: self.has_next,
            results: self.items.iter().map(|entity| (*entity).clone()).collect(),
        }
    }
}

/// Owned, serializable form of a [`PageView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePayload {
    pub query: String,
    pub tag: Option<String>,
    pub page: usize,
    pub total_pages: usize,
    pub items_per_page: usize,
    pub filtered_count: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub results: Vec<EntityDetail>,
}
