use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::filter::schema::format_timestamp;
use crate::policy::PrincipalId;

pub const ID: &str = "id";
pub const OWNER: &str = "user";
pub const CREATED_AT: &str = "created_at";
pub const VERSION: &str = "version";

/// Keys the store manages; request bodies cannot set them.
pub const RESERVED_FIELDS: [&str; 4] = [ID, OWNER, CREATED_AT, VERSION];

/// A catalog resource (bootcamp, course, review) as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Builds a new document from client fields, stamping identity, owner and
    /// creation time. Reserved keys in `fields` are discarded.
    pub fn create(fields: Map<String, Value>, owner: PrincipalId, now: DateTime<Utc>) -> Self {
        let mut map = strip_reserved(fields);
        map.insert(ID.into(), Value::String(Uuid::new_v4().to_string()));
        map.insert(OWNER.into(), Value::String(owner.to_string()));
        map.insert(CREATED_AT.into(), Value::String(format_timestamp(&now)));
        map.insert(VERSION.into(), Value::from(0));
        Self(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn id(&self) -> Option<Uuid> {
        self.uuid_field(ID)
    }

    /// `None` when the owner reference is absent or malformed.
    pub fn owner(&self) -> Option<PrincipalId> {
        self.uuid_field(OWNER).map(PrincipalId)
    }

    pub fn version(&self) -> i64 {
        self.0.get(VERSION).and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn uuid_field(&self, key: &str) -> Option<Uuid> {
        self.0.get(key).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merges client changes. Reserved keys are left untouched and the
    /// revision counter is bumped.
    pub fn apply_patch(&mut self, patch: Map<String, Value>) {
        for (key, value) in strip_reserved(patch) {
            self.0.insert(key, value);
        }
        let next = self.version() + 1;
        self.0.insert(VERSION.into(), Value::from(next));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

pub fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}
