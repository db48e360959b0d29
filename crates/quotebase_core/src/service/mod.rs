//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own transaction boundaries for mutations and snapshot reads.
//! - Keep transport/CLI layers decoupled from storage details.

use serde::{Deserialize, Serialize};

pub mod mutation_service;
pub mod query_service;

/// Identity fact supplied by the external authorization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caller {
    Anonymous,
    Authenticated { subject: String },
}

impl Caller {
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self::Authenticated {
            subject: subject.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}
