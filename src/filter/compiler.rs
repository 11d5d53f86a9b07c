use serde_json::Value;

use crate::config::FilterConfig;

use super::schema::{FieldDef, FieldKind, ResourceSchema};
use super::types::{
    FilterOp, Pagination, Populate, Predicate, Projection, QueryDescriptor, SortDirection, SortKey,
};

pub const RESERVED_KEYS: [&str; 4] = ["select", "sort", "page", "limit"];

/// Internal revision field hidden from responses unless explicitly selected away.
pub const REVISION_FIELD: &str = "version";

const DEFAULT_SORT_FIELD: &str = "created_at";

/// Operator attached to a filter key.
#[derive(Debug, PartialEq)]
enum Suffix<'a> {
    None,
    Known(FilterOp),
    Unknown(&'a str),
}

/// Turns a raw query-string mapping into a bounded [`QueryDescriptor`].
///
/// Compilation never fails: unknown fields are dropped, malformed values fall
/// back to defaults. The only inputs that reach the store are fields declared
/// by the resource schema and values coerced to the field's kind.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: FilterConfig,
}

impl QueryCompiler {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn compile(&self, schema: &ResourceSchema, raw: &[(String, String)]) -> QueryDescriptor {
        self.compile_with_populate(schema, raw, vec![])
    }

    pub fn compile_with_populate(
        &self,
        schema: &ResourceSchema,
        raw: &[(String, String)],
        populate: Vec<Populate>,
    ) -> QueryDescriptor {
        let mut select = None;
        let mut sort = None;
        let mut page = None;
        let mut limit = None;
        let mut predicates = Vec::new();

        for (key, value) in raw {
            match key.as_str() {
                "select" => select = Some(value.as_str()),
                "sort" => sort = Some(value.as_str()),
                "page" => page = Some(value.as_str()),
                "limit" => limit = Some(value.as_str()),
                _ => {
                    if let Some(predicate) = self.compile_predicate(schema, key, value) {
                        predicates.push(predicate);
                    }
                }
            }
        }

        let descriptor = QueryDescriptor {
            predicates,
            projection: self.compile_projection(schema, select),
            sort: self.compile_sort(schema, sort),
            pagination: self.compile_pagination(page, limit),
            populate,
        };

        if self.config.debug_logging {
            tracing::debug!(
                collection = schema.collection,
                predicates = descriptor.predicates.len(),
                "compiled query: {:?}",
                descriptor
            );
        }

        descriptor
    }

    fn compile_predicate(&self, schema: &ResourceSchema, key: &str, raw_value: &str) -> Option<Predicate> {
        let Some((field, suffix)) = split_key(schema, key) else {
            self.dropped(schema, key, "field not in schema");
            return None;
        };

        // Value-prefix form: `cost=gte:5000`
        let (suffix, raw_value) = match suffix {
            Suffix::None => match raw_value.split_once(':') {
                Some((token, rest)) => match FilterOp::from_suffix(token) {
                    Some(op) => (Suffix::Known(op), rest),
                    None => (Suffix::None, raw_value),
                },
                None => (Suffix::None, raw_value),
            },
            other => (other, raw_value),
        };

        let op = match suffix {
            Suffix::None => FilterOp::Eq,
            Suffix::Known(op) => op,
            Suffix::Unknown(token) => {
                if self.config.strict_operators {
                    self.dropped(schema, key, &format!("unrecognized operator '{}'", token));
                    return None;
                }
                FilterOp::Eq
            }
        };

        let value = match op {
            FilterOp::In => {
                let values: Vec<Value> = raw_value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .filter_map(|s| field.kind.coerce(s))
                    .collect();
                if values.is_empty() {
                    self.dropped(schema, key, "empty $in list");
                    return None;
                }
                Value::Array(values)
            }
            FilterOp::Eq => field.kind.coerce(raw_value)?,
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                if field.kind == FieldKind::TextList {
                    self.dropped(schema, key, "range operator on list field");
                    return None;
                }
                field.kind.coerce(raw_value)?
            }
        };

        Some(Predicate { field: field.name.to_string(), op, value })
    }

    fn compile_projection(&self, schema: &ResourceSchema, select: Option<&str>) -> Projection {
        let mut fields: Vec<String> = Vec::new();
        if let Some(select) = select {
            for name in select.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !schema.contains(name) {
                    self.dropped(schema, name, "select field not in schema");
                    continue;
                }
                if !fields.iter().any(|f| f == name) {
                    fields.push(name.to_string());
                }
            }
        }

        if fields.is_empty() {
            return Projection::Exclude(vec![REVISION_FIELD.to_string()]);
        }
        if !fields.iter().any(|f| f == "id") {
            fields.insert(0, "id".to_string());
        }
        Projection::Include(fields)
    }

    fn compile_sort(&self, schema: &ResourceSchema, sort: Option<&str>) -> Vec<SortKey> {
        let mut keys: Vec<SortKey> = Vec::new();
        if let Some(sort) = sort {
            for token in sort.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (name, direction) = match token.strip_prefix('-') {
                    Some(name) => (name, SortDirection::Desc),
                    None => (token.trim_start_matches('+'), SortDirection::Asc),
                };
                if !schema.contains(name) {
                    self.dropped(schema, name, "sort field not in schema");
                    continue;
                }
                if keys.iter().any(|k| k.field == name) {
                    continue;
                }
                keys.push(SortKey { field: name.to_string(), direction });
            }
        }

        if keys.is_empty() {
            keys.push(SortKey { field: DEFAULT_SORT_FIELD.to_string(), direction: SortDirection::Desc });
        }
        keys
    }

    fn compile_pagination(&self, page: Option<&str>, limit: Option<&str>) -> Pagination {
        let page = parse_positive(page).unwrap_or(1);
        let mut limit = parse_positive(limit).unwrap_or(self.config.default_limit);
        if limit > self.config.max_limit {
            if self.config.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, self.config.max_limit);
            }
            limit = self.config.max_limit;
        }
        let offset = (page - 1).saturating_mul(limit);
        Pagination { page, limit, offset }
    }

    fn dropped(&self, schema: &ResourceSchema, key: &str, reason: &str) {
        if self.config.debug_logging {
            tracing::debug!(collection = schema.collection, key, "dropping query parameter: {}", reason);
        }
    }
}

/// Compiles with the default filter configuration.
pub fn compile(schema: &ResourceSchema, raw: &[(String, String)]) -> QueryDescriptor {
    QueryCompiler::default().compile(schema, raw)
}

/// Resolves a filter key to a declared field and its operator suffix.
/// Accepts `field`, `field[op]` and `field.op`.
fn split_key<'a>(schema: &'a ResourceSchema, key: &'a str) -> Option<(&'a FieldDef, Suffix<'a>)> {
    if let Some(stripped) = key.strip_suffix(']') {
        let (base, token) = stripped.split_once('[')?;
        let field = schema.field(base)?;
        return Some((field, classify(token)));
    }

    if let Some(field) = schema.field(key) {
        return Some((field, Suffix::None));
    }

    let (base, token) = key.rsplit_once('.')?;
    let field = schema.field(base)?;
    Some((field, classify(token)))
}

fn classify(token: &str) -> Suffix<'_> {
    match FilterOp::from_suffix(token) {
        Some(op) => Suffix::Known(op),
        None => Suffix::Unknown(token),
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::schema::{BOOTCAMP_SCHEMA, COURSE_SCHEMA, REVIEW_SCHEMA};
    use serde_json::json;

    fn raw(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn sort_parses_directions_in_order() {
        let q = compile(&REVIEW_SCHEMA, &raw(&[("sort", "-rating,title")]));
        assert_eq!(
            q.sort,
            vec![
                SortKey { field: "rating".into(), direction: SortDirection::Desc },
                SortKey { field: "title".into(), direction: SortDirection::Asc },
            ]
        );
    }

    #[test]
    fn default_sort_is_newest_first() {
        let q = compile(&REVIEW_SCHEMA, &[]);
        assert_eq!(q.sort, vec![SortKey { field: "created_at".into(), direction: SortDirection::Desc }]);
    }

    #[test]
    fn value_prefix_operator_compiles_to_comparison() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("tuition", "gte:5000")]));
        assert_eq!(q.predicates, vec![Predicate { field: "tuition".into(), op: FilterOp::Gte, value: json!(5000) }]);
    }

    #[test]
    fn bracket_and_dotted_suffixes_compile_to_comparison() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("tuition[lt]", "10000"), ("weeks.gt", "4")]));
        assert_eq!(q.predicates[0], Predicate { field: "tuition".into(), op: FilterOp::Lt, value: json!(10000) });
        assert_eq!(q.predicates[1], Predicate { field: "weeks".into(), op: FilterOp::Gt, value: json!(4) });
    }

    #[test]
    fn in_operator_splits_list() {
        let q = compile(&BOOTCAMP_SCHEMA, &raw(&[("careers[in]", "Business,UI/UX")]));
        assert_eq!(q.predicates[0].op, FilterOp::In);
        assert_eq!(q.predicates[0].value, json!(["Business", "UI/UX"]));
    }

    #[test]
    fn plain_key_is_equality() {
        let q = compile(&BOOTCAMP_SCHEMA, &raw(&[("housing", "true")]));
        assert_eq!(q.predicates, vec![Predicate { field: "housing".into(), op: FilterOp::Eq, value: json!(true) }]);
    }

    #[test]
    fn unknown_suffix_fails_open_by_default() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("tuition[ne]", "5000")]));
        assert_eq!(q.predicates, vec![Predicate { field: "tuition".into(), op: FilterOp::Eq, value: json!(5000) }]);
    }

    #[test]
    fn unknown_suffix_is_dropped_when_strict() {
        let compiler = QueryCompiler::new(FilterConfig { strict_operators: true, ..FilterConfig::default() });
        let q = compiler.compile(&COURSE_SCHEMA, &raw(&[("tuition[ne]", "5000"), ("weeks", "8")]));
        assert_eq!(q.predicates.len(), 1);
        assert_eq!(q.predicates[0].field, "weeks");
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let q = compile(
            &COURSE_SCHEMA,
            &raw(&[("password", "x"), ("$where", "1"), ("select", "title,secret"), ("sort", "secret")]),
        );
        assert!(q.predicates.is_empty());
        assert_eq!(q.projection, Projection::Include(vec!["id".into(), "title".into()]));
        assert_eq!(q.sort[0].field, "created_at");
    }

    #[test]
    fn uncoercible_values_are_dropped() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("tuition[gte]", "lots"), ("bootcamp", "not-a-uuid")]));
        assert!(q.predicates.is_empty());
    }

    #[test]
    fn default_projection_excludes_revision() {
        let q = compile(&COURSE_SCHEMA, &[]);
        assert_eq!(q.projection, Projection::Exclude(vec!["version".into()]));
    }

    #[test]
    fn pagination_defaults_and_offsets() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("page", "2"), ("limit", "10")]));
        assert_eq!(q.pagination, Pagination { page: 2, limit: 10, offset: 10 });

        let q = compile(&COURSE_SCHEMA, &[]);
        assert_eq!(q.pagination, Pagination { page: 1, limit: 100, offset: 0 });

        let q = compile(&COURSE_SCHEMA, &raw(&[("page", "zero"), ("limit", "-5")]));
        assert_eq!(q.pagination, Pagination { page: 1, limit: 100, offset: 0 });
    }

    #[test]
    fn limit_is_capped_and_offset_saturates() {
        let q = compile(&COURSE_SCHEMA, &raw(&[("page", &u64::MAX.to_string()), ("limit", "999999")]));
        assert_eq!(q.pagination.limit, 1000);
        assert_eq!(q.pagination.offset, u64::MAX);
    }

    #[test]
    fn populate_is_attached_verbatim() {
        let hint = Populate::belongs_to("bootcamp", "no_such_collection", &["name"]);
        let q = QueryCompiler::default().compile_with_populate(&REVIEW_SCHEMA, &[], vec![hint.clone()]);
        assert_eq!(q.populate, vec![hint]);
    }

    #[test]
    fn hostile_inputs_only_reference_schema_fields() {
        let inputs = [
            ("select", ",,,,"),
            ("sort", "-,-,--rating"),
            ("rating[gte][lt]", "3"),
            ("rating[", "3"),
            ("[gt]", "3"),
            ("rating.", "3"),
            (".gt", "3"),
            ("user.password_hash", "x"),
            ("text", "gt:"),
            ("rating", "in:"),
            ("limit", "18446744073709551616"),
            ("page", ""),
            ("title[in]", ",,,"),
            ("bootcamp[in]", "a,b"),
        ];
        for (k, v) in inputs {
            let q = compile(&REVIEW_SCHEMA, &raw(&[(k, v)]));
            for field in q.referenced_fields() {
                assert!(
                    REVIEW_SCHEMA.contains(field) || field == REVISION_FIELD,
                    "{} leaked from {}={}",
                    field,
                    k,
                    v
                );
            }
        }
    }
}
