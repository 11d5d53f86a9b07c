use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{QueryDescriptor, SqlResult};

/// SQL renderer for a compiled [`QueryDescriptor`] against a table whose
/// rows are exposed as a JSONB document expression.
pub struct Filter<'a> {
    table_name: String,
    document: String,
    descriptor: &'a QueryDescriptor,
}

impl<'a> Filter<'a> {
    /// `document` is the SQL expression yielding each row as JSONB, e.g.
    /// `"doc"` for document tables or `to_jsonb("users")` for typed ones.
    pub fn new(
        table_name: impl Into<String>,
        document: impl Into<String>,
        descriptor: &'a QueryDescriptor,
    ) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            document: document.into(),
            descriptor,
        })
    }

    /// `SELECT <columns> FROM … WHERE … ORDER BY … LIMIT … OFFSET …`
    pub fn to_sql(&self, columns: &str) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.document, &self.descriptor.predicates, 0)?;
        let order_clause = FilterOrder::generate(&self.document, &self.descriptor.sort)?;
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT {}", columns),
            format!("FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_clause),
            order_clause,
            limit_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult { query, params })
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() {
            return Err(FilterError::InvalidTableName("Table name cannot be empty".to_string()));
        }
        let first = name.chars().next().unwrap_or('0');
        if !(first.is_ascii_alphabetic() || first == '_') || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }

    fn build_limit_clause(&self) -> String {
        let pagination = &self.descriptor.pagination;
        // Postgres takes bigint here
        let limit = pagination.limit.min(i64::MAX as u64);
        let offset = pagination.offset.min(i64::MAX as u64);
        format!("LIMIT {} OFFSET {}", limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compiler::compile;
    use crate::filter::schema::COURSE_SCHEMA;

    #[test]
    fn renders_full_select() {
        let raw = vec![
            ("tuition[gte]".to_string(), "5000".to_string()),
            ("sort".to_string(), "-weeks".to_string()),
            ("page".to_string(), "3".to_string()),
            ("limit".to_string(), "20".to_string()),
        ];
        let q = compile(&COURSE_SCHEMA, &raw);
        let sql = Filter::new("courses", "\"doc\"", &q).unwrap().to_sql("\"doc\"").unwrap();
        assert_eq!(
            sql.query,
            "SELECT \"doc\" FROM \"courses\" WHERE \"doc\" -> 'tuition' >= $1::jsonb ORDER BY \"doc\" -> 'weeks' DESC LIMIT 20 OFFSET 40"
        );
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn rejects_bad_table_names() {
        let q = compile(&COURSE_SCHEMA, &[]);
        assert!(Filter::new("courses; DROP TABLE users", "\"doc\"", &q).is_err());
        assert!(Filter::new("", "\"doc\"", &q).is_err());
    }
}
