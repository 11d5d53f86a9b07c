pub mod compiler;
pub mod error;
pub mod eval;
pub mod filter;
pub mod filter_order;
pub mod filter_where;
pub mod schema;
pub mod types;

pub use compiler::{compile, QueryCompiler};
pub use filter::Filter;
pub use schema::ResourceSchema;
pub use types::*;
