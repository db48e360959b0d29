//! Quote filter request and compilation into a query plan.
//!
//! # Invariants
//! - Absent and empty text fields add no condition.
//! - Free-text `search` is one OR group; every other field is ANDed.
//! - A `language` other than the configured content language compiles to
//!   [`Predicate::Never`].

use super::pagination::Pagination;
use super::predicate::Predicate;
use crate::config::CoreConfig;
use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};

/// Filter fields accepted by quote list and count queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteFilter {
    /// Matches content, author name, category names or source names.
    pub search: Option<String>,
    pub content: Option<String>,
    /// Author name substring.
    pub author: Option<String>,
    /// Category name substring.
    pub category: Option<String>,
    /// Source name substring.
    pub source: Option<String>,
    pub author_id: Option<EntityId>,
    pub category_id: Option<EntityId>,
    pub source_id: Option<EntityId>,
    pub language: Option<String>,
    pub skip: Option<u32>,
    pub first: Option<u32>,
    pub limit: Option<u32>,
}

impl QuoteFilter {
    /// Same conditions with `skip`/`first` removed; `limit` is kept.
    pub fn without_window(&self) -> Self {
        Self {
            skip: None,
            first: None,
            ..self.clone()
        }
    }
}

/// Compiled quote query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePlan {
    pub predicate: Predicate,
    pub pagination: Pagination,
    /// Set when the predicate joins through an association.
    pub distinct: bool,
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Compiles `filter` against the configured content language.
pub fn compile(filter: &QuoteFilter, config: &CoreConfig) -> QuotePlan {
    let mut predicate = Predicate::Always;

    if let Some(term) = text(&filter.search) {
        let term = term.to_string();
        let any_field = Predicate::ContentContains(term.clone())
            .or(Predicate::AuthorNameContains(term.clone()))
            .or(Predicate::CategoryNameContains(term.clone()))
            .or(Predicate::SourceNameContains(term));
        predicate = predicate.and(any_field);
    }
    if let Some(content) = text(&filter.content) {
        predicate = predicate.and(Predicate::ContentContains(content.to_string()));
    }
    if let Some(author) = text(&filter.author) {
        predicate = predicate.and(Predicate::AuthorNameContains(author.to_string()));
    }
    if let Some(category) = text(&filter.category) {
        predicate = predicate.and(Predicate::CategoryNameContains(category.to_string()));
    }
    if let Some(source) = text(&filter.source) {
        predicate = predicate.and(Predicate::SourceNameContains(source.to_string()));
    }
    if let Some(author_id) = filter.author_id {
        predicate = predicate.and(Predicate::AuthorIs(author_id));
    }
    if let Some(category_id) = filter.category_id {
        predicate = predicate.and(Predicate::CategoryIs(category_id));
    }
    if let Some(source_id) = filter.source_id {
        predicate = predicate.and(Predicate::SourceIs(source_id));
    }
    if let Some(language) = text(&filter.language) {
        if !config.is_content_language(language) {
            predicate = predicate.and(Predicate::Never);
        }
    }

    let distinct = predicate.traverses_association();
    QuotePlan {
        predicate,
        pagination: Pagination::new(filter.limit, filter.skip, filter.first),
        distinct,
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, QuoteFilter};
    use crate::config::CoreConfig;
    use crate::query::predicate::Predicate;

    #[test]
    fn empty_filter_matches_everything() {
        let plan = compile(&QuoteFilter::default(), &CoreConfig::default());
        assert_eq!(plan.predicate, Predicate::Always);
        assert!(!plan.distinct);
    }

    #[test]
    fn empty_strings_are_ignored() {
        let filter = QuoteFilter {
            search: Some(String::new()),
            author: Some(String::new()),
            language: Some(String::new()),
            ..QuoteFilter::default()
        };
        let plan = compile(&filter, &CoreConfig::default());
        assert_eq!(plan.predicate, Predicate::Always);
    }

    #[test]
    fn search_is_one_or_group_and_sets_distinct() {
        let filter = QuoteFilter {
            search: Some("freedom".to_string()),
            author_id: Some(4),
            ..QuoteFilter::default()
        };
        let plan = compile(&filter, &CoreConfig::default());
        let term = || "freedom".to_string();
        assert_eq!(
            plan.predicate,
            Predicate::And(vec![
                Predicate::Or(vec![
                    Predicate::ContentContains(term()),
                    Predicate::AuthorNameContains(term()),
                    Predicate::CategoryNameContains(term()),
                    Predicate::SourceNameContains(term()),
                ]),
                Predicate::AuthorIs(4),
            ])
        );
        assert!(plan.distinct);
    }

    #[test]
    fn author_only_filters_do_not_need_distinct() {
        let filter = QuoteFilter {
            author: Some("twain".to_string()),
            content: Some("truth".to_string()),
            ..QuoteFilter::default()
        };
        assert!(!compile(&filter, &CoreConfig::default()).distinct);
    }

    #[test]
    fn language_filter_is_noop_for_content_language_only() {
        let config = CoreConfig::default();
        let english = QuoteFilter {
            language: Some("EN".to_string()),
            ..QuoteFilter::default()
        };
        assert_eq!(compile(&english, &config).predicate, Predicate::Always);

        let chinese = QuoteFilter {
            language: Some("zh".to_string()),
            ..QuoteFilter::default()
        };
        assert_eq!(compile(&chinese, &config).predicate, Predicate::Never);
    }

    #[test]
    fn pagination_fields_flow_into_plan() {
        let filter = QuoteFilter {
            limit: Some(5),
            skip: Some(2),
            first: Some(10),
            ..QuoteFilter::default()
        };
        let plan = compile(&filter, &CoreConfig::default());
        assert_eq!(plan.pagination.limit(), Some(5));
        assert_eq!(plan.pagination.skip(), Some(2));
        assert_eq!(plan.pagination.first(), Some(10));

        let counted = filter.without_window();
        assert_eq!(counted.limit, Some(5));
        assert_eq!(counted.skip, None);
    }
}
