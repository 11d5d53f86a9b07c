use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators a query-string filter may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
    #[serde(rename = "$in")] In,
}

impl FilterOp {
    /// Recognizes the bare suffix tokens accepted in query strings.
    pub fn from_suffix(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            _ => None,
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Relation expansion hint. Passed through the compiler untouched and
/// resolved by the store layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Populate {
    /// Key the related document(s) are attached under.
    pub path: String,
    /// Collection the related documents live in.
    pub collection: String,
    pub relation: Relation,
    /// Fields kept on the related documents; empty keeps everything.
    pub select: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// `path` holds the id of a single related document.
    BelongsTo,
    /// Related documents point back at this one through `foreign_field`.
    HasMany { foreign_field: String },
}

impl Populate {
    pub fn belongs_to(path: &str, collection: &str, select: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            collection: collection.to_string(),
            relation: Relation::BelongsTo,
            select: select.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn has_many(path: &str, collection: &str, foreign_field: &str) -> Self {
        Self {
            path: path.to_string(),
            collection: collection.to_string(),
            relation: Relation::HasMany { foreign_field: foreign_field.to_string() },
            select: vec![],
        }
    }
}

/// Compiled, schema-validated form of a list request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub predicates: Vec<Predicate>,
    pub projection: Projection,
    pub sort: Vec<SortKey>,
    pub pagination: Pagination,
    pub populate: Vec<Populate>,
}

impl QueryDescriptor {
    /// Unfiltered descriptor for internal lookups (first page, given limit).
    pub fn all(limit: u64) -> Self {
        Self {
            predicates: vec![],
            projection: Projection::Exclude(vec![]),
            sort: vec![],
            pagination: Pagination { page: 1, limit, offset: 0 },
            populate: vec![],
        }
    }

    pub fn with_predicate(mut self, field: &str, op: FilterOp, value: Value) -> Self {
        self.predicates.push(Predicate { field: field.to_string(), op, value });
        self
    }

    /// Every field name the descriptor refers to, excluding populate hints.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.predicates.iter().map(|p| p.field.as_str()).collect();
        match &self.projection {
            Projection::Include(list) | Projection::Exclude(list) => {
                fields.extend(list.iter().map(|s| s.as_str()))
            }
        }
        fields.extend(self.sort.iter().map(|s| s.field.as_str()));
        fields
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
