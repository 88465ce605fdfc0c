//! API handlers module

pub mod chat;
pub mod conversations;
pub mod health;

use menuchat_common::errors::AppError;
use validator::Validate;

/// Run `validator` rules and map failures to a 400
pub(crate) fn validate<T: Validate>(request: &T) -> Result<(), AppError> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|k| k.to_string()),
    })
}
