use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Storage kind of a declared field; drives query-string value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Timestamp,
    /// Id of another document (UUID string).
    Reference,
    /// Array of strings; equality matches membership.
    TextList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind }
}

/// Declared set of fields a resource exposes to filtering, projection and
/// sorting. Anything outside it never reaches the store.
#[derive(Debug)]
pub struct ResourceSchema {
    pub collection: &'static str,
    pub fields: &'static [FieldDef],
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

impl FieldKind {
    /// Converts a raw query-string value into the JSON value stored for this
    /// kind. `None` means the value cannot be represented and the predicate
    /// must be dropped.
    pub fn coerce(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            FieldKind::Text | FieldKind::TextList => Some(Value::String(raw.to_string())),
            FieldKind::Number => {
                if let Ok(i) = raw.parse::<i64>() {
                    return Some(Value::Number(i.into()));
                }
                raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
            }
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            FieldKind::Timestamp => parse_timestamp(raw).map(|ts| Value::String(format_timestamp(&ts))),
            FieldKind::Reference => uuid::Uuid::parse_str(raw).ok().map(|id| Value::String(id.to_string())),
        }
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that JSON string
/// ordering matches chronological ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub static BOOTCAMP_SCHEMA: ResourceSchema = ResourceSchema {
    collection: "bootcamps",
    fields: &[
        field("id", FieldKind::Reference),
        field("name", FieldKind::Text),
        field("slug", FieldKind::Text),
        field("description", FieldKind::Text),
        field("website", FieldKind::Text),
        field("phone", FieldKind::Text),
        field("email", FieldKind::Text),
        field("address", FieldKind::Text),
        field("careers", FieldKind::TextList),
        field("average_rating", FieldKind::Number),
        field("average_cost", FieldKind::Number),
        field("photo", FieldKind::Text),
        field("housing", FieldKind::Boolean),
        field("job_assistance", FieldKind::Boolean),
        field("job_guarantee", FieldKind::Boolean),
        field("accept_gi", FieldKind::Boolean),
        field("user", FieldKind::Reference),
        field("created_at", FieldKind::Timestamp),
    ],
};

pub static COURSE_SCHEMA: ResourceSchema = ResourceSchema {
    collection: "courses",
    fields: &[
        field("id", FieldKind::Reference),
        field("title", FieldKind::Text),
        field("description", FieldKind::Text),
        field("weeks", FieldKind::Number),
        field("tuition", FieldKind::Number),
        field("minimum_skill", FieldKind::Text),
        field("scholarship_available", FieldKind::Boolean),
        field("bootcamp", FieldKind::Reference),
        field("user", FieldKind::Reference),
        field("created_at", FieldKind::Timestamp),
    ],
};

pub static REVIEW_SCHEMA: ResourceSchema = ResourceSchema {
    collection: "reviews",
    fields: &[
        field("id", FieldKind::Reference),
        field("title", FieldKind::Text),
        field("text", FieldKind::Text),
        field("rating", FieldKind::Number),
        field("bootcamp", FieldKind::Reference),
        field("user", FieldKind::Reference),
        field("created_at", FieldKind::Timestamp),
    ],
};

/// Public profile fields only; credential columns are not addressable.
pub static USER_SCHEMA: ResourceSchema = ResourceSchema {
    collection: "users",
    fields: &[
        field("id", FieldKind::Reference),
        field("name", FieldKind::Text),
        field("email", FieldKind::Text),
        field("role", FieldKind::Text),
        field("is_email_confirmed", FieldKind::Boolean),
        field("created_at", FieldKind::Timestamp),
    ],
};
