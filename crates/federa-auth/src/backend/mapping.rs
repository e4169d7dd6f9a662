//! Mapping of provider attributes onto [`AuthDetails`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{AuthDetails, normalize_email};

/// Which provider attribute feeds which [`AuthDetails`] field.
///
/// Attribute names are looked up verbatim in the provider's attribute map:
/// federation URIs for SAML assertions, claim names for OAuth2, JSON keys for
/// credential APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Attribute carrying the provider uid.
    pub uid: String,

    /// Attribute carrying the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Attribute carrying the given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Attribute carrying the family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Attribute carrying the full display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Attribute carrying group memberships (list or comma-separated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,

    /// Claim name to attribute, e.g. `school_role`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, String>,

    /// Attributes copied verbatim into the identity's extra data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
}

impl AttributeMapping {
    /// Creates a mapping with only the uid attribute set.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            first_name: None,
            last_name: None,
            full_name: None,
            groups: None,
            claims: BTreeMap::new(),
            extra: Vec::new(),
        }
    }

    /// Sets the email attribute.
    #[must_use]
    pub fn with_email(mut self, attribute: impl Into<String>) -> Self {
        self.email = Some(attribute.into());
        self
    }

    /// Sets the given and family name attributes.
    #[must_use]
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Sets the full name attribute.
    #[must_use]
    pub fn with_full_name(mut self, attribute: impl Into<String>) -> Self {
        self.full_name = Some(attribute.into());
        self
    }

    /// Sets the groups attribute.
    #[must_use]
    pub fn with_groups(mut self, attribute: impl Into<String>) -> Self {
        self.groups = Some(attribute.into());
        self
    }

    /// Maps `attribute` onto the claim `claim`.
    #[must_use]
    pub fn with_claim(mut self, claim: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.claims.insert(claim.into(), attribute.into());
        self
    }

    /// Keeps `attribute` as identity extra data.
    #[must_use]
    pub fn with_extra(mut self, attribute: impl Into<String>) -> Self {
        self.extra.push(attribute.into());
        self
    }

    /// Builds details from an attribute map. Missing attributes are skipped.
    #[must_use]
    pub fn details(&self, attrs: &Map<String, Value>) -> AuthDetails {
        let lookup = |name: &Option<String>| {
            name.as_deref()
                .and_then(|n| attrs.get(n))
                .and_then(text_value)
        };

        let mut details = AuthDetails {
            email: normalize_email(lookup(&self.email).as_deref()),
            first_name: lookup(&self.first_name).unwrap_or_default(),
            last_name: lookup(&self.last_name).unwrap_or_default(),
            full_name: lookup(&self.full_name).filter(|n| !n.is_empty()),
            ..AuthDetails::default()
        };

        if let Some(value) = self.groups.as_deref().and_then(|g| attrs.get(g)) {
            details.groups = list_value(value);
        }

        for (claim, attribute) in &self.claims {
            if let Some(value) = attrs.get(attribute).and_then(text_value)
                && !value.is_empty()
            {
                details.claims.insert(claim.clone(), value);
            }
        }

        for attribute in &self.extra {
            if let Some(value) = attrs.get(attribute) {
                details.extra.insert(attribute.clone(), value.clone());
            }
        }

        details
    }
}

/// Scalar text of an attribute value, trimmed.
///
/// Lists yield their first element; numbers are stringified.
pub(crate) fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(text_value),
        _ => None,
    }
}

/// All non-empty text entries of a list, or of a comma-separated string.
fn list_value(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(text_value).collect(),
        Value::String(s) => s.split(',').map(|g| g.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|g| !g.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_details_from_scalar_and_list_values() {
        let mapping = AttributeMapping::new("uid")
            .with_email("mail")
            .with_names("given", "sn")
            .with_groups("memberOf")
            .with_claim("school_role", "role");

        let details = mapping.details(&attrs(json!({
            "uid": "x",
            "mail": ["  Aino.Virtanen@Turku.FI "],
            "given": "Aino ",
            "sn": ["Virtanen"],
            "memberOf": ["staff", "", "teachers"],
            "role": ["student"]
        })));

        assert_eq!(details.email.as_deref(), Some("aino.virtanen@turku.fi"));
        assert_eq!(details.first_name, "Aino");
        assert_eq!(details.last_name, "Virtanen");
        assert_eq!(details.groups, vec!["staff", "teachers"]);
        assert_eq!(details.claim("school_role"), Some("student"));
    }

    #[test]
    fn test_missing_attributes_are_skipped() {
        let mapping = AttributeMapping::new("uid")
            .with_email("mail")
            .with_claim("school_role", "role");
        let details = mapping.details(&attrs(json!({"uid": "x", "mail": "   "})));

        assert_eq!(details.email, None);
        assert!(details.first_name.is_empty());
        assert_eq!(details.claim("school_role"), None);
    }

    #[test]
    fn test_comma_separated_groups() {
        let mapping = AttributeMapping::new("sub").with_groups("groups");
        let details = mapping.details(&attrs(json!({"groups": "a, b ,c"})));
        assert_eq!(details.groups, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_extra_attributes_are_copied() {
        let mapping = AttributeMapping::new("borrowernumber").with_extra("categorycode");
        let details = mapping.details(&attrs(json!({"categorycode": "ADULT", "other": 1})));
        assert_eq!(details.extra.get("categorycode"), Some(&json!("ADULT")));
        assert!(!details.extra.contains_key("other"));
    }
}
