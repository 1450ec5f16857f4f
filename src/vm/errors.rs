//! Script error values
//!
//! Errors raised inside the VM are ordinary values (`Val::Error`) carrying a
//! stable code and a human-readable message.

use serde::{Deserialize, Serialize};

use super::types::Val;

pub const UNDEFINED_VARIABLE: &str = "UNDEFINED_VARIABLE";
pub const PROPERTY_NOT_FOUND: &str = "PROPERTY_NOT_FOUND";
pub const TYPE_ERROR: &str = "TYPE_ERROR";
pub const NOT_CALLABLE: &str = "NOT_CALLABLE";
pub const UNKNOWN_FUNCTION: &str = "UNKNOWN_FUNCTION";
pub const WRONG_ARG_COUNT: &str = "WRONG_ARG_COUNT";
pub const WRONG_ARG_TYPE: &str = "WRONG_ARG_TYPE";
pub const DIVISION_BY_ZERO: &str = "DIVISION_BY_ZERO";
pub const AWAIT_NOT_ALLOWED: &str = "AWAIT_NOT_ALLOWED";
pub const NATIVE_ERROR: &str = "NATIVE_ERROR";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn into_val(self) -> Val {
        Val::Error(self)
    }
}

/// Shorthand for an error value
pub fn error_val(code: &str, message: impl Into<String>) -> Val {
    Val::Error(ErrorInfo::new(code, message))
}
