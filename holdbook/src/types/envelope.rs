use serde::{Deserialize, Serialize};

use crate::error::{HoldbookError, Result};

/// Standard backend response wrapper. `code == 0` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, turning a non-zero `code` into [`HoldbookError::Api`].
    pub fn into_result(self) -> Result<Option<T>> {
        if self.code != 0 {
            return Err(HoldbookError::Api {
                code: self.code,
                message: self.message,
            });
        }
        Ok(self.data)
    }
}
