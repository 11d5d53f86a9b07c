pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use manager::DatabaseManager;
pub use store::{CredentialStore, DocumentStore, StoreError, Stores};
