use futures::future::join_all;
use std::sync::Arc;
use tokio::time::timeout;

use crate::database::DocumentStore;
use crate::observer::error::ObserverError;
use crate::observer::traits::{MutationObserver, ResourceEvent};

/// Post-mutation fan-out. Observer failures are logged and never undo or fail
/// the mutation that triggered them.
#[derive(Default, Clone)]
pub struct ObserverPipeline {
    observers: Vec<Arc<dyn MutationObserver>>,
}

impl ObserverPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the catalog aggregate observers registered.
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::new();
        pipeline.register_observer(Arc::new(super::aggregates::AverageRatingObserver));
        pipeline.register_observer(Arc::new(super::aggregates::AverageCostObserver));
        pipeline
    }

    pub fn register_observer(&mut self, observer: Arc<dyn MutationObserver>) {
        tracing::debug!("Registered observer '{}'", observer.name());
        self.observers.push(observer);
    }

    /// Runs every applicable observer concurrently and returns how many
    /// failed.
    pub async fn notify(&self, event: &ResourceEvent, store: &dyn DocumentStore) -> usize {
        let applicable: Vec<_> = self
            .observers
            .iter()
            .filter(|o| o.applies_to_collection(&event.collection) && o.applies_to_operation(event.operation))
            .collect();

        if applicable.is_empty() {
            return 0;
        }

        let runs = applicable.iter().map(|observer| async move {
            let outcome = match timeout(observer.timeout(), observer.execute(event, store)).await {
                Ok(result) => result,
                Err(_) => Err(ObserverError::TimeoutError(format!(
                    "Observer {} timed out after {:?}",
                    observer.name(),
                    observer.timeout()
                ))),
            };
            (observer.name(), outcome)
        });

        let mut failures = 0;
        for (name, outcome) in join_all(runs).await {
            if let Err(e) = outcome {
                failures += 1;
                tracing::error!(
                    "Observer '{}' failed on {:?} {}: {}",
                    name,
                    event.operation,
                    event.collection,
                    e
                );
            }
        }
        failures
    }
}
