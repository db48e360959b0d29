//! Core domain logic for Quotebase.
//! This crate is the single source of truth for quote data and counter invariants.

pub mod config;
pub mod counter;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use counter::{
    recompute_counters, verify_counters, CounterDrift, CounterEngine, CounterError, CounterEvent,
    RecomputeReport,
};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::entity::{EntityId, EntityKind, NamedEntity};
pub use model::link::{LinkId, LinkKind, QuoteLink};
pub use model::quote::{Quote, QuoteId, QuoteRecord};
pub use query::{Pagination, QueryError, QueryResult, QuoteFilter};
pub use repo::entity_repo::{EntityListQuery, EntityOrder, SortDirection};
pub use repo::{RepoError, RepoResult};
pub use service::mutation_service::{
    AuthorUpdate, MutationError, MutationErrorKind, MutationOp, MutationService, QuoteInput,
    QuoteUpdate,
};
pub use service::query_service::QueryService;
pub use service::Caller;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
