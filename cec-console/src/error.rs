//! Console errors

use cec_core::CecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Cec(#[from] CecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no answer to {0} within {1:?}")]
    Timeout(String, std::time::Duration),
}
