use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::database::models::Document;
use crate::database::DocumentStore;
use crate::observer::error::ObserverError;

/// Mutations observers are notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A completed mutation. `document` is the state after create/update and the
/// last known state for delete.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub collection: String,
    pub operation: Operation,
    pub document: Document,
}

impl ResourceEvent {
    pub fn new(collection: &str, operation: Operation, document: Document) -> Self {
        Self {
            collection: collection.to_string(),
            operation,
            document,
        }
    }
}

pub trait Observer: Send + Sync {
    /// Observer name for logging
    fn name(&self) -> &'static str;

    fn applies_to_collection(&self, collection: &str) -> bool;

    fn applies_to_operation(&self, _op: Operation) -> bool {
        true
    }

    /// Execution timeout (default 5 seconds)
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

/// Runs after the store has committed a mutation.
#[async_trait]
pub trait MutationObserver: Observer {
    async fn execute(&self, event: &ResourceEvent, store: &dyn DocumentStore) -> Result<(), ObserverError>;
}
