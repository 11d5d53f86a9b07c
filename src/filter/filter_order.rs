use super::error::FilterError;
use super::filter_where::json_path;
use super::types::SortKey;

pub struct FilterOrder;

impl FilterOrder {
    pub fn generate(document: &str, keys: &[SortKey]) -> Result<String, FilterError> {
        if keys.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            parts.push(format!("{} {}", json_path(document, &key.field)?, key.direction.to_sql()));
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
