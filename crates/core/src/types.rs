use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::GeoLocation;

/// Everything known about one subject: its installation, the user owning it
/// and the events it tracked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub installation: Option<Record>,
    pub user: Option<Record>,
    #[serde(default)]
    pub events: Vec<Record>,
}

/// A scope record (installation, user or event).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Custom fields, possibly nested.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Instant each field last changed, keyed by dotted path.
    #[serde(default)]
    pub updated_at: HashMap<String, DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity_date: Option<DateTime<Utc>>,
    /// Set while the subject has an active session.
    pub presence_since: Option<DateTime<Utc>>,
    pub location: Option<GeoLocation>,
    pub location_date: Option<DateTime<Utc>>,
    pub subscription_status: Option<SubscriptionStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionStatus {
    OptIn,
    OptOut,
    SoftOptOut,
}

impl SubscriptionStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "optIn" => Some(Self::OptIn),
            "optOut" => Some(Self::OptOut),
            "softOptOut" => Some(Self::SoftOptOut),
            _ => None,
        }
    }
}

impl Record {
    /// Reads a possibly nested custom field. `null` reads as absent.
    pub fn field<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.properties.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        (!current.is_null()).then_some(current)
    }

    /// When the field at `path` last changed, falling back to the record's
    /// creation date.
    pub fn field_changed_at(&self, path: &str) -> Option<DateTime<Utc>> {
        self.updated_at.get(path).copied().or(self.created_at)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_field_changed_at(mut self, path: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.updated_at.insert(path.into(), at);
        self
    }

    pub fn with_last_activity_date(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity_date = Some(at);
        self
    }

    pub fn with_presence_since(mut self, at: DateTime<Utc>) -> Self {
        self.presence_since = Some(at);
        self
    }

    pub fn with_location(mut self, location: GeoLocation, at: Option<DateTime<Utc>>) -> Self {
        self.location = Some(location);
        self.location_date = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_field_lookup() {
        let record = Record::default()
            .with_property("profile", json!({"age": 42, "nickname": null}))
            .with_property("plan", json!("pro"));
        assert_eq!(record.field(&["plan"]), Some(&json!("pro")));
        assert_eq!(record.field(&["profile", "age"]), Some(&json!(42)));
        assert_eq!(record.field(&["profile", "nickname"]), None);
        assert_eq!(record.field(&["plan", "tier"]), None);
        assert_eq!(record.field::<&str>(&[]), None);
    }

    #[test]
    fn test_subject_from_json() {
        let subject: Subject = serde_json::from_value(json!({
            "installation": {
                "properties": {"plan": "free"},
                "lastActivityDate": "2024-05-01T10:00:00Z",
                "subscriptionStatus": "softOptOut",
                "location": {"lat": 48.85, "lon": 2.35}
            },
            "events": [{"properties": {"type": "purchase"}}]
        }))
        .unwrap();
        let installation = subject.installation.unwrap();
        assert_eq!(
            installation.subscription_status,
            Some(SubscriptionStatus::SoftOptOut)
        );
        assert!(installation.last_activity_date.is_some());
        assert!(subject.user.is_none());
        assert_eq!(subject.events.len(), 1);
    }

    #[test]
    fn test_field_changed_at_falls_back_to_creation() {
        let created = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let changed = "2024-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mut record = Record::default().with_field_changed_at("plan", changed);
        record.created_at = Some(created);
        assert_eq!(record.field_changed_at("plan"), Some(changed));
        assert_eq!(record.field_changed_at("other"), Some(created));
    }
}
