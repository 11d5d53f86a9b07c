use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, Predicate};

/// Renders compiled predicates into a parameterized WHERE clause over a JSONB
/// document expression. Every value is bound as a JSONB parameter, so
/// comparisons follow Postgres JSONB ordering (numbers numerically, strings
/// lexically).
pub struct FilterWhere<'a> {
    document: &'a str,
    param_values: Vec<Value>,
    param_index: usize,
}

impl<'a> FilterWhere<'a> {
    pub fn new(document: &'a str, starting_param_index: usize) -> Self {
        Self {
            document,
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn generate(
        document: &'a str,
        predicates: &[Predicate],
        starting_param_index: usize,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(document, starting_param_index);
        filter_where.build(predicates)
    }

    fn build(&mut self, predicates: &[Predicate]) -> Result<(String, Vec<Value>), FilterError> {
        let mut sql_conditions = vec![];
        for predicate in predicates {
            sql_conditions.push(self.build_sql_condition(predicate)?);
        }
        let where_clause = if sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            sql_conditions.join(" AND ")
        };
        Ok((where_clause, std::mem::take(&mut self.param_values)))
    }

    fn build_sql_condition(&mut self, predicate: &Predicate) -> Result<String, FilterError> {
        let path = json_path(self.document, &predicate.field)?;
        match predicate.op {
            FilterOp::Eq => {
                if predicate.value.is_null() {
                    return Ok(format!("({} IS NULL OR {} = 'null'::jsonb)", path, path));
                }
                // Arrays match on membership, scalars on equality
                let param = self.param(predicate.value.clone());
                Ok(format!(
                    "(CASE WHEN jsonb_typeof({path}) = 'array' THEN {path} @> jsonb_build_array({param}) ELSE {path} = {param} END)",
                    path = path,
                    param = param
                ))
            }
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let param = self.param(predicate.value.clone());
                Ok(format!("{} {} {}", path, predicate.op.to_sql(), param))
            }
            FilterOp::In => {
                let Value::Array(values) = &predicate.value else {
                    return Err(FilterError::InvalidOperatorData("$in requires an array".to_string()));
                };
                if values.is_empty() {
                    return Ok("1=0".to_string());
                }
                let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                Ok(format!(
                    "(CASE WHEN jsonb_typeof({path}) = 'array' THEN {path} ?| ARRAY(SELECT jsonb_array_elements_text(jsonb_build_array({list}))) ELSE {path} IN ({list}) END)",
                    path = path,
                    list = params.join(", ")
                ))
            }
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}::jsonb", self.param_index)
    }
}

/// `"doc" -> 'field'`. Field names come from a declared schema; they are
/// still validated because this string is spliced into SQL.
pub fn json_path(document: &str, field: &str) -> Result<String, FilterError> {
    validate_field_name(field)?;
    Ok(format!("{} -> '{}'", document, field))
}

pub fn validate_field_name(name: &str) -> Result<(), FilterError> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return Err(FilterError::InvalidColumn(name.to_string())),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidColumn(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pred(field: &str, op: FilterOp, value: Value) -> Predicate {
        Predicate { field: field.to_string(), op, value }
    }

    #[test]
    fn renders_comparison_with_jsonb_param() {
        let (sql, params) =
            FilterWhere::generate("\"doc\"", &[pred("tuition", FilterOp::Gte, json!(5000))], 0).unwrap();
        assert_eq!(sql, "\"doc\" -> 'tuition' >= $1::jsonb");
        assert_eq!(params, vec![json!(5000)]);
    }

    #[test]
    fn numbers_parameters_after_offset() {
        let (sql, params) = FilterWhere::generate(
            "\"doc\"",
            &[pred("weeks", FilterOp::Lt, json!(10)), pred("rating", FilterOp::In, json!([1, 2]))],
            2,
        )
        .unwrap();
        assert!(sql.starts_with("\"doc\" -> 'weeks' < $3::jsonb AND "));
        assert!(sql.contains("$4::jsonb, $5::jsonb"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_predicates_match_everything() {
        let (sql, params) = FilterWhere::generate("\"doc\"", &[], 0).unwrap();
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, _) = FilterWhere::generate("\"doc\"", &[pred("rating", FilterOp::In, json!([]))], 0).unwrap();
        assert_eq!(sql, "1=0");
    }

    #[test]
    fn rejects_injected_field_names() {
        let err = FilterWhere::generate("\"doc\"", &[pred("x' OR '1'='1", FilterOp::Eq, json!(1))], 0);
        assert!(matches!(err, Err(FilterError::InvalidColumn(_))));
    }
}
