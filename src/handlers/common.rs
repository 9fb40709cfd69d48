use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};

/// Pagination parameters for list operations.
#[derive(Debug, Deserialize, Serialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    /// Bounds-checks the requested page window against the configured limit.
    pub fn validate_against(&self, max_page_size: u64) -> Result<(), ServiceError> {
        if self.page < 1 {
            return Err(ServiceError::ValidationError(
                "page must be at least 1".to_string(),
            ));
        }
        if self.page_size < 1 || self.page_size > max_page_size {
            return Err(ServiceError::ValidationError(format!(
                "page_size must be between 1 and {max_page_size}"
            )));
        }
        Ok(())
    }
}
