//! Credential form description and validation.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::Credentials;

/// One input of a credential form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Form field name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Maximum length in characters after trimming.
    pub max_length: Option<usize>,
}

impl FieldSpec {
    /// Creates a field.
    #[must_use]
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            max_length: None,
        }
    }

    /// Limits the field length.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    fn clean(&self, data: &HashMap<String, String>, errors: &mut FormErrors) -> String {
        let value = data
            .get(&self.name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        if value.is_empty() {
            errors.add(&self.name, "This field is required.");
        } else if let Some(max) = self.max_length {
            let len = value.chars().count();
            if len > max {
                errors.add(
                    &self.name,
                    format!("Ensure this value has at most {max} characters (it has {len})."),
                );
            }
        }
        value
    }
}

/// The two-field form of a credential backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSpec {
    /// Page heading.
    pub title: String,
    /// The identifier input (card number, username).
    pub identifier: FieldSpec,
    /// The secret input (PIN, password).
    pub secret: FieldSpec,
}

impl FormSpec {
    /// Validates submitted form data.
    ///
    /// Both fields are trimmed and must be non-empty and within their length
    /// limits. No external call is made here.
    ///
    /// # Errors
    ///
    /// Returns the field errors when any field is invalid.
    pub fn validate(&self, data: &HashMap<String, String>) -> Result<Credentials, FormErrors> {
        let mut errors = FormErrors::default();
        let identifier = self.identifier.clean(data, &mut errors);
        let secret = self.secret.clean(data, &mut errors);

        if errors.is_empty() {
            Ok(Credentials::new(identifier, secret))
        } else {
            Err(errors)
        }
    }
}

/// A validation error on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// Message shown next to the field.
    pub message: String,
}

/// Errors attached to a re-rendered form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    /// Per-field errors.
    pub fields: Vec<FieldError>,
    /// Error not tied to a field, e.g. rejected credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<String>,
}

impl FormErrors {
    /// Creates errors holding only a general message.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            general: Some(message.into()),
        }
    }

    /// Returns `true` if there are no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.general.is_none()
    }

    /// Messages for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }
}
