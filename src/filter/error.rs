use thiserror::Error;

/// Rendering errors. The compiler itself never produces these; they guard the
/// SQL layer against descriptors built by hand.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),
}
