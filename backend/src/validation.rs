//! Field checks for request payloads
//!
//! A `Validator` collects every failing field before returning, so clients
//! get one 422 listing all problems instead of fixing them one at a time.

use crate::error::{AppError, FieldErrors};

/// Task priorities accepted on templates
pub const TASK_PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

/// Event lifecycle states
pub const EVENT_STATUSES: &[&str] = &["planned", "confirmed", "cancelled", "completed"];

fn blank_message(value: &Option<String>, field: &str) -> Option<String> {
    match value.as_deref().map(str::trim) {
        None => Some(format!("{} is required", field)),
        Some("") => Some(format!("{} cannot be empty", field)),
        Some(_) => None,
    }
}

/// Helpers that extract a cleaned string from an optional payload field
pub mod string {
    use super::*;

    /// Trimmed value of a field that must be present and non-blank
    pub fn required(value: &Option<String>, field: &str) -> Result<String, AppError> {
        match blank_message(value, field) {
            Some(message) => Err(Validator::new().error(field, &message).into_error()),
            None => Ok(value.as_deref().map(str::trim).unwrap_or_default().to_string()),
        }
    }

    pub fn optional(value: Option<String>) -> Option<String> {
        value
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn error_if(self, condition: bool, field: &str, message: &str) -> Self {
        if condition { self.error(field, message) } else { self }
    }

    pub fn required_string(self, value: &Option<String>, field: &str) -> Self {
        match blank_message(value, field) {
            Some(message) => self.error(field, &message),
            None => self,
        }
    }

    /// Length is counted in characters after trimming
    pub fn max_length(self, value: &Option<String>, field: &str, max: usize) -> Self {
        let too_long = value
            .as_deref()
            .is_some_and(|s| s.trim().chars().count() > max);
        self.error_if(
            too_long,
            field,
            &format!("{} must be {} characters or less", field, max),
        )
    }

    /// `None` passes; only a present value is bounds-checked
    pub fn in_range(self, value: Option<i32>, field: &str, min: i32, max: i32) -> Self {
        let outside = value.is_some_and(|n| !(min..=max).contains(&n));
        self.error_if(
            outside,
            field,
            &format!("{} must be between {} and {}", field, min, max),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn into_error(self) -> AppError {
        AppError::ValidationError { details: self.errors }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.is_valid() { Ok(()) } else { Err(self.into_error()) }
    }
}
