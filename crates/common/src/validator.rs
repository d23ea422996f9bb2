//! Form validation: per-field and page-level error accumulation.
//!
//! A [`Validator`] only ever gains errors; the values being checked live in a
//! [`FormSubmission`] which exposes them read-only.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::protocol::ApiRejection;

/// WHATWG-style email address pattern.
pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("EMAIL_RX is a valid pattern")
});

/// Accumulated validation failures for one form submission.
///
/// Only the first message recorded for a field is kept, so each field renders
/// at most one error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    field_errors: BTreeMap<String, String>,
    non_field_errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` iff no field or non-field error has been recorded.
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Record `message` against `key` unless the field already has an error.
    pub fn add_field_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(key.into())
            .or_insert_with(|| message.into());
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    /// Record `message` against `key` when `ok` is false.
    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }
}

/// Decoded form values paired with their validation state.
///
/// The values are fixed at construction; only the error state can change.
#[derive(Debug, Clone)]
pub struct FormSubmission<F> {
    values: F,
    validator: Validator,
}

impl<F> FormSubmission<F> {
    pub fn new(values: F) -> Self {
        Self {
            values,
            validator: Validator::new(),
        }
    }

    pub fn values(&self) -> &F {
        &self.values
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn valid(&self) -> bool {
        self.validator.valid()
    }

    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        self.validator.check_field(ok, key, message);
    }

    pub fn add_field_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.validator.add_field_error(key, message);
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.validator.add_non_field_error(message);
    }

    /// Fold a backend rejection into this submission's errors.
    ///
    /// Field messages go through [`Validator::add_field_error`], so errors the
    /// caller recorded first take precedence.
    pub fn merge_rejection(&mut self, rejection: &ApiRejection) {
        for (key, message) in &rejection.fields {
            if !key.trim().is_empty() {
                self.validator.add_field_error(key.as_str(), message.as_str());
            }
        }
        for message in &rejection.general {
            self.validator.add_non_field_error(message.as_str());
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// `true` if `value` has at most `n` characters.
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

/// `true` if `value` has at least `n` characters.
pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// `true` if `value` has exactly `n` characters.
pub fn exact_chars(value: &str, n: usize) -> bool {
    value.chars().count() == n
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}
