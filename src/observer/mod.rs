pub mod aggregates;
pub mod error;
pub mod pipeline;
pub mod traits;

pub use error::ObserverError;
pub use pipeline::ObserverPipeline;
pub use traits::{MutationObserver, Observer, Operation, ResourceEvent};
