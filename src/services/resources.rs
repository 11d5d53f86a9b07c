//! Load → authorize → mutate → notify, shared by every catalog resource.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::document::{strip_reserved, OWNER};
use crate::database::models::Document;
use crate::database::store::populate;
use crate::database::{DocumentStore, StoreError};
use crate::filter::schema::{FieldKind, ResourceSchema, BOOTCAMP_SCHEMA, COURSE_SCHEMA, REVIEW_SCHEMA};
use crate::filter::types::{FilterOp, Populate, Predicate, QueryDescriptor};
use crate::filter::QueryCompiler;
use crate::observer::{ObserverPipeline, Operation, ResourceEvent};
use crate::policy::{
    authorize, authorize_create, Action, Decision, DenyReason, Principal, ResourcePolicy, BOOTCAMP_POLICY,
    COURSE_POLICY, REVIEW_POLICY,
};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Denied(DenyReason),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a child resource hangs off its parent.
#[derive(Debug)]
pub struct ParentLink {
    pub field: &'static str,
    pub kind: &'static ResourceKind,
    /// Action checked against the parent when attaching a child.
    pub action: Action,
}

/// Static description of one catalog resource.
#[derive(Debug)]
pub struct ResourceKind {
    pub label: &'static str,
    pub schema: &'static ResourceSchema,
    pub policy: &'static ResourcePolicy,
    pub parent: Option<ParentLink>,
    pub required: &'static [&'static str],
    /// Maintained by the server; ignored in request bodies.
    pub computed: &'static [&'static str],
    pub unique_on: &'static [&'static str],
    pub populate: fn() -> Vec<Populate>,
}

impl ResourceKind {
    pub fn collection(&self) -> &'static str {
        self.schema.collection
    }
}

fn bootcamp_populate() -> Vec<Populate> {
    vec![Populate::has_many("courses", "courses", "bootcamp")]
}

fn parent_summary_populate() -> Vec<Populate> {
    vec![Populate::belongs_to("bootcamp", "bootcamps", &["name", "description"])]
}

pub static BOOTCAMPS: ResourceKind = ResourceKind {
    label: "bootcamp",
    schema: &BOOTCAMP_SCHEMA,
    policy: &BOOTCAMP_POLICY,
    parent: None,
    required: &["name", "description"],
    computed: &["slug", "average_rating", "average_cost"],
    unique_on: &["name"],
    populate: bootcamp_populate,
};

pub static COURSES: ResourceKind = ResourceKind {
    label: "course",
    schema: &COURSE_SCHEMA,
    policy: &COURSE_POLICY,
    parent: Some(ParentLink {
        field: "bootcamp",
        kind: &BOOTCAMPS,
        action: Action::AddChild,
    }),
    required: &["title", "description", "weeks", "tuition", "minimum_skill"],
    computed: &[],
    unique_on: &[],
    populate: parent_summary_populate,
};

pub static REVIEWS: ResourceKind = ResourceKind {
    label: "review",
    schema: &REVIEW_SCHEMA,
    policy: &REVIEW_POLICY,
    parent: Some(ParentLink {
        field: "bootcamp",
        kind: &BOOTCAMPS,
        action: Action::Read,
    }),
    required: &["title", "text", "rating"],
    computed: &[],
    unique_on: &["bootcamp", "user"],
    populate: parent_summary_populate,
};

const SKILL_LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];

/// Every catalog mutation goes through here, so no handler can skip the
/// policy check or the observer notification.
#[derive(Clone)]
pub struct ResourceService {
    store: Arc<dyn DocumentStore>,
    observers: ObserverPipeline,
}

impl ResourceService {
    pub fn new(store: Arc<dyn DocumentStore>, observers: ObserverPipeline) -> Self {
        Self { store, observers }
    }

    pub async fn list(
        &self,
        kind: &ResourceKind,
        compiler: &QueryCompiler,
        raw: &[(String, String)],
    ) -> Result<Vec<Document>, ResourceError> {
        let query = compiler.compile_with_populate(kind.schema, raw, (kind.populate)());
        self.run(kind, &query).await
    }

    /// Children of one parent; the parent must exist.
    pub async fn list_children(
        &self,
        kind: &ResourceKind,
        parent_id: Uuid,
        compiler: &QueryCompiler,
        raw: &[(String, String)],
    ) -> Result<Vec<Document>, ResourceError> {
        let link = parent_link(kind)?;
        self.load(link.kind, parent_id).await?;

        let mut query = compiler.compile(kind.schema, raw);
        query.predicates.retain(|p| p.field != link.field);
        query.predicates.push(Predicate {
            field: link.field.to_string(),
            op: FilterOp::Eq,
            value: Value::String(parent_id.to_string()),
        });
        self.run(kind, &query).await
    }

    pub async fn get(&self, kind: &ResourceKind, id: Uuid) -> Result<Document, ResourceError> {
        let doc = self.load(kind, id).await?;
        let mut docs = populate(self.store.as_ref(), vec![doc], &(kind.populate)()).await?;
        docs.pop().ok_or_else(|| not_found(kind, id))
    }

    /// Top-level creation; the principal becomes the owner.
    pub async fn create(
        &self,
        kind: &ResourceKind,
        principal: &Principal,
        body: Map<String, Value>,
    ) -> Result<Document, ResourceError> {
        let limited = kind.policy.limits_owner(principal);
        let already_owned = limited && self.owns_any(kind, principal).await?;
        check(authorize_create(principal, kind.policy, already_owned))?;

        let fields = sanitize(kind, body, true)?;
        let doc = Document::create(fields, principal.id, Utc::now());
        // the store re-checks ownership atomically with the insert
        match self.insert(kind, doc, limited).await {
            Err(ResourceError::Store(StoreError::Conflict(key))) if limited && key == OWNER => {
                tracing::warn!("Access denied: {}", DenyReason::AlreadyOwnsResource);
                Err(ResourceError::Denied(DenyReason::AlreadyOwnsResource))
            }
            other => other,
        }
    }

    /// Attaches a child (course, review) to an existing parent.
    pub async fn create_child(
        &self,
        kind: &ResourceKind,
        principal: &Principal,
        parent_id: Uuid,
        body: Map<String, Value>,
    ) -> Result<Document, ResourceError> {
        let link = parent_link(kind)?;
        let parent = self.load(link.kind, parent_id).await?;
        check(authorize(principal, link.action, link.kind.policy, parent.owner()))?;
        check(authorize_create(principal, kind.policy, false))?;

        let mut fields = sanitize(kind, body, true)?;
        fields.insert(link.field.to_string(), Value::String(parent_id.to_string()));
        let doc = Document::create(fields, principal.id, Utc::now());
        self.insert(kind, doc, false).await
    }

    pub async fn update(
        &self,
        kind: &ResourceKind,
        principal: &Principal,
        id: Uuid,
        body: Map<String, Value>,
    ) -> Result<Document, ResourceError> {
        let existing = self.load(kind, id).await?;
        check(authorize(principal, Action::Update, kind.policy, existing.owner()))?;

        let patch = sanitize(kind, body, false)?;
        let updated = self
            .store
            .update(kind.collection(), id, patch)
            .await?
            .ok_or_else(|| not_found(kind, id))?;

        tracing::info!("Updated {} {} by {}", kind.label, id, principal.id);
        self.notify(kind, Operation::Update, &updated).await;
        Ok(updated)
    }

    pub async fn delete(&self, kind: &ResourceKind, principal: &Principal, id: Uuid) -> Result<Document, ResourceError> {
        let existing = self.load(kind, id).await?;
        check(authorize(principal, Action::Delete, kind.policy, existing.owner()))?;

        if !self.store.delete(kind.collection(), id).await? {
            return Err(not_found(kind, id));
        }
        // children go with their parent
        for child in [&COURSES, &REVIEWS] {
            if let Some(link) = &child.parent {
                if std::ptr::eq(link.kind, kind) {
                    let removed = self
                        .store
                        .delete_where(child.collection(), link.field, &Value::String(id.to_string()))
                        .await?;
                    if removed > 0 {
                        tracing::info!("Removed {} {} of {} {}", removed, child.collection(), kind.label, id);
                    }
                }
            }
        }

        tracing::info!("Deleted {} {} by {}", kind.label, id, principal.id);
        self.notify(kind, Operation::Delete, &existing).await;
        Ok(existing)
    }

    async fn run(&self, kind: &ResourceKind, query: &QueryDescriptor) -> Result<Vec<Document>, ResourceError> {
        let docs = self.store.find(kind.collection(), query).await?;
        Ok(populate(self.store.as_ref(), docs, &query.populate).await?)
    }

    async fn load(&self, kind: &ResourceKind, id: Uuid) -> Result<Document, ResourceError> {
        self.store
            .get(kind.collection(), id)
            .await?
            .ok_or_else(|| not_found(kind, id))
    }

    async fn owns_any(&self, kind: &ResourceKind, principal: &Principal) -> Result<bool, ResourceError> {
        let query = QueryDescriptor::all(1).with_predicate(OWNER, FilterOp::Eq, Value::String(principal.id.to_string()));
        Ok(!self.store.find(kind.collection(), &query).await?.is_empty())
    }

    async fn insert(&self, kind: &ResourceKind, doc: Document, one_per_owner: bool) -> Result<Document, ResourceError> {
        let mut keys: Vec<&[&str]> = vec![kind.unique_on];
        if one_per_owner {
            keys.push(&[OWNER]);
        }
        let created = match self.store.insert(kind.collection(), doc, &keys).await {
            Ok(created) => created,
            Err(StoreError::Conflict(key)) if key == OWNER => return Err(StoreError::Conflict(key).into()),
            Err(StoreError::Conflict(_)) => {
                return Err(StoreError::Conflict(conflict_message(kind)).into());
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Created {} {:?}", kind.label, created.id());
        self.notify(kind, Operation::Create, &created).await;
        Ok(created)
    }

    async fn notify(&self, kind: &ResourceKind, operation: Operation, doc: &Document) {
        let event = ResourceEvent::new(kind.collection(), operation, doc.clone());
        self.observers.notify(&event, self.store.as_ref()).await;
    }
}

fn parent_link(kind: &ResourceKind) -> Result<&ParentLink, ResourceError> {
    kind.parent
        .as_ref()
        .ok_or_else(|| ResourceError::Validation(format!("{} has no parent resource", kind.label)))
}

fn check(decision: Decision) -> Result<(), ResourceError> {
    match decision {
        Decision::Allowed => Ok(()),
        Decision::Denied(reason) => {
            tracing::warn!("Access denied: {}", reason);
            Err(ResourceError::Denied(reason))
        }
    }
}

fn not_found(kind: &ResourceKind, id: Uuid) -> ResourceError {
    ResourceError::NotFound(format!("No {} with the id of {}", kind.label, id))
}

fn conflict_message(kind: &ResourceKind) -> String {
    match kind.label {
        "review" => "This bootcamp has already been reviewed by this user".to_string(),
        label => format!("Duplicate {} on {}", label, kind.unique_on.join(", ")),
    }
}

/// Keeps declared, client-settable fields and checks their types. On create,
/// required fields must be present.
fn sanitize(kind: &ResourceKind, body: Map<String, Value>, creating: bool) -> Result<Map<String, Value>, ResourceError> {
    let mut fields = Map::new();
    for (key, value) in strip_reserved(body) {
        let Some(def) = kind.schema.field(&key) else { continue };
        if kind.computed.contains(&key.as_str()) {
            continue;
        }
        if kind.parent.as_ref().map(|p| p.field == key).unwrap_or(false) {
            continue;
        }
        if !value.is_null() && !type_matches(def.kind, &value) {
            return Err(ResourceError::Validation(format!("Invalid value for {}", key)));
        }
        fields.insert(key, value);
    }

    if creating {
        let missing: Vec<&str> = kind
            .required
            .iter()
            .copied()
            .filter(|f| fields.get(*f).map(Value::is_null).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(ResourceError::Validation(format!("Please add {}", missing.join(", "))));
        }
    } else if let Some(required) = kind.required.iter().find(|f| fields.get(**f).map(Value::is_null).unwrap_or(false)) {
        return Err(ResourceError::Validation(format!("{} cannot be cleared", required)));
    }

    if let Some(rating) = fields.get("rating").and_then(Value::as_f64) {
        if !(1.0..=10.0).contains(&rating) {
            return Err(ResourceError::Validation("Please add a rating between 1 and 10".to_string()));
        }
    }
    if let Some(skill) = fields.get("minimum_skill").and_then(Value::as_str) {
        if !SKILL_LEVELS.contains(&skill) {
            return Err(ResourceError::Validation(format!(
                "minimum_skill must be one of {}",
                SKILL_LEVELS.join(", ")
            )));
        }
    }
    if let Some(name) = fields.get("name").and_then(Value::as_str) {
        if kind.computed.contains(&"slug") {
            let slug = slugify(name);
            fields.insert("slug".to_string(), Value::String(slug));
        }
    }
    Ok(fields)
}

fn type_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::Text => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Timestamp => value.is_string(),
        FieldKind::Reference => value.as_str().map(|s| Uuid::parse_str(s).is_ok()).unwrap_or(false),
        FieldKind::TextList => value
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false),
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
