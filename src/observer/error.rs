use thiserror::Error;

use crate::database::StoreError;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
