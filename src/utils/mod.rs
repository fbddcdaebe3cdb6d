// Utility modules for the identity core

pub mod auth_errors;
pub mod path_glob;
pub mod validation;

pub use auth_errors::{AuthError, AuthErrorResponse, FieldError};
pub use path_glob::{normalize_path, PathMatcher};
pub use validation::{
    is_valid_e164, is_valid_email, trim_and_validate_field, trim_optional_field,
};
