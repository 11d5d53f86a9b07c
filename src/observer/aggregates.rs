//! Bootcamp summary fields derived from their children.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::DocumentStore;
use crate::filter::types::{FilterOp, QueryDescriptor};
use crate::observer::error::ObserverError;
use crate::observer::traits::{MutationObserver, Observer, ResourceEvent};

const PARENT_COLLECTION: &str = "bootcamps";
const PARENT_FIELD: &str = "bootcamp";

fn parent_of(event: &ResourceEvent) -> Result<Uuid, ObserverError> {
    event
        .document
        .uuid_field(PARENT_FIELD)
        .ok_or_else(|| ObserverError::InvalidEvent(format!("{} without a bootcamp reference", event.collection)))
}

/// Numeric `field` of every child document attached to `parent`.
async fn child_values(
    store: &dyn DocumentStore,
    collection: &str,
    parent: Uuid,
    field: &str,
) -> Result<Vec<f64>, ObserverError> {
    let query = QueryDescriptor::all(u64::MAX).with_predicate(PARENT_FIELD, FilterOp::Eq, Value::String(parent.to_string()));
    let children = store.find(collection, &query).await?;
    Ok(children
        .iter()
        .filter_map(|c| c.get(field).and_then(Value::as_f64))
        .collect())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

async fn write_summary(
    store: &dyn DocumentStore,
    parent: Uuid,
    field: &str,
    value: Option<f64>,
) -> Result<(), ObserverError> {
    let mut patch = Map::new();
    patch.insert(field.to_string(), value.map(Value::from).unwrap_or(Value::Null));
    store.update(PARENT_COLLECTION, parent, patch).await?;
    Ok(())
}

/// Keeps `average_rating` on a bootcamp equal to the mean review rating,
/// rounded to one decimal. Removed when the last review goes.
pub struct AverageRatingObserver;

impl Observer for AverageRatingObserver {
    fn name(&self) -> &'static str {
        "average_rating"
    }

    fn applies_to_collection(&self, collection: &str) -> bool {
        collection == "reviews"
    }
}

#[async_trait]
impl MutationObserver for AverageRatingObserver {
    async fn execute(&self, event: &ResourceEvent, store: &dyn DocumentStore) -> Result<(), ObserverError> {
        let parent = parent_of(event)?;
        let ratings = child_values(store, &event.collection, parent, "rating").await?;
        let average = mean(&ratings).map(|avg| (avg * 10.0).round() / 10.0);
        write_summary(store, parent, "average_rating", average).await
    }
}

/// Keeps `average_cost` on a bootcamp equal to the mean course tuition,
/// rounded up to the next multiple of ten.
pub struct AverageCostObserver;

impl Observer for AverageCostObserver {
    fn name(&self) -> &'static str {
        "average_cost"
    }

    fn applies_to_collection(&self, collection: &str) -> bool {
        collection == "courses"
    }
}

#[async_trait]
impl MutationObserver for AverageCostObserver {
    async fn execute(&self, event: &ResourceEvent, store: &dyn DocumentStore) -> Result<(), ObserverError> {
        let parent = parent_of(event)?;
        let tuitions = child_values(store, &event.collection, parent, "tuition").await?;
        let average = mean(&tuitions).map(|avg| (avg / 10.0).ceil() * 10.0);
        write_summary(store, parent, "average_cost", average).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::models::Document;
    use crate::observer::traits::Operation;
    use crate::policy::PrincipalId;
    use chrono::Utc;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn bootcamp(store: &MemoryStore) -> Uuid {
        let doc = Document::create(fields(json!({"name": "Devworks"})), PrincipalId(Uuid::new_v4()), Utc::now());
        store.insert("bootcamps", doc, &[]).await.unwrap().id().unwrap()
    }

    async fn child(store: &MemoryStore, collection: &str, body: Value) -> Document {
        let doc = Document::create(fields(body), PrincipalId(Uuid::new_v4()), Utc::now());
        store.insert(collection, doc, &[]).await.unwrap()
    }

    #[tokio::test]
    async fn average_rating_rounds_to_one_decimal() {
        let store = MemoryStore::new();
        let camp = bootcamp(&store).await;
        child(&store, "reviews", json!({"bootcamp": camp.to_string(), "rating": 8})).await;
        child(&store, "reviews", json!({"bootcamp": camp.to_string(), "rating": 7})).await;
        let last = child(&store, "reviews", json!({"bootcamp": camp.to_string(), "rating": 7})).await;

        AverageRatingObserver
            .execute(&ResourceEvent::new("reviews", Operation::Create, last), &store)
            .await
            .unwrap();
        let doc = store.get("bootcamps", camp).await.unwrap().unwrap();
        assert_eq!(doc.get("average_rating"), Some(&json!(7.3)));
    }

    #[tokio::test]
    async fn average_rating_cleared_when_no_reviews_remain() {
        let store = MemoryStore::new();
        let camp = bootcamp(&store).await;
        let review = child(&store, "reviews", json!({"bootcamp": camp.to_string(), "rating": 9})).await;
        let id = review.id().unwrap();
        AverageRatingObserver
            .execute(&ResourceEvent::new("reviews", Operation::Create, review.clone()), &store)
            .await
            .unwrap();

        store.delete("reviews", id).await.unwrap();
        AverageRatingObserver
            .execute(&ResourceEvent::new("reviews", Operation::Delete, review), &store)
            .await
            .unwrap();
        let doc = store.get("bootcamps", camp).await.unwrap().unwrap();
        assert!(doc.get("average_rating").is_none());
    }

    #[tokio::test]
    async fn average_cost_rounds_up_to_tens() {
        let store = MemoryStore::new();
        let camp = bootcamp(&store).await;
        child(&store, "courses", json!({"bootcamp": camp.to_string(), "tuition": 8000})).await;
        let last = child(&store, "courses", json!({"bootcamp": camp.to_string(), "tuition": 10001})).await;

        AverageCostObserver
            .execute(&ResourceEvent::new("courses", Operation::Create, last), &store)
            .await
            .unwrap();
        let doc = store.get("bootcamps", camp).await.unwrap().unwrap();
        assert_eq!(doc.get("average_cost"), Some(&json!(9010.0)));
    }

    #[tokio::test]
    async fn missing_parent_reference_is_an_error() {
        let store = MemoryStore::new();
        let orphan = child(&store, "reviews", json!({"rating": 3})).await;
        let result = AverageRatingObserver
            .execute(&ResourceEvent::new("reviews", Operation::Create, orphan), &store)
            .await;
        assert!(matches!(result, Err(ObserverError::InvalidEvent(_))));
    }
}
