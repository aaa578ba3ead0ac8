//! Canonicalization of heterogeneous Bundle entries.
//!
//! Inbound entries come in two shapes: the usual Bundle form
//! `{"resource": {...}}`, and a bare resource carrying its own
//! `resourceType`. Both are accepted; extraction always works on the inner
//! resource object.

use serde_json::Value;

/// Resource types the pipeline extracts. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Patient,
    Encounter,
    Observation,
}

impl ResourceKind {
    fn from_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" => Some(Self::Patient),
            "Encounter" => Some(Self::Encounter),
            "Observation" => Some(Self::Observation),
            _ => None,
        }
    }
}

/// Canonicalize one entry: unwrap `{"resource": {...}}` when present,
/// otherwise treat the entry itself as the resource. Returns the inner
/// resource object and its kind, or `None` for unrecognized or malformed
/// entries.
pub fn resource_of(entry: &Value) -> Option<(ResourceKind, &Value)> {
    let resource = match entry.get("resource") {
        Some(inner) => inner,
        None => entry,
    };
    let kind = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .and_then(ResourceKind::from_type)?;
    resource.is_object().then_some((kind, resource))
}

/// Host-language truthiness, as the original service applied it to scalar
/// values: `null`, `false`, `0`, `0.0`, and `""` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_bundle_entry_shape() {
        let entry = json!({"resource": {"resourceType": "Patient", "id": "P1"}});
        let (kind, resource) = resource_of(&entry).unwrap();
        assert_eq!(kind, ResourceKind::Patient);
        assert_eq!(resource["id"], "P1");
    }

    #[test]
    fn accepts_bare_resource_shape() {
        let entry = json!({"resourceType": "Observation", "id": "O1"});
        let (kind, _) = resource_of(&entry).unwrap();
        assert_eq!(kind, ResourceKind::Observation);
    }

    #[test]
    fn ignores_other_resource_types() {
        assert!(resource_of(&json!({"resourceType": "Organization"})).is_none());
        assert!(resource_of(&json!({"resource": {"resourceType": "Medication"}})).is_none());
    }

    #[test]
    fn ignores_entries_without_a_type() {
        assert!(resource_of(&json!({"id": "x"})).is_none());
        assert!(resource_of(&json!(null)).is_none());
    }

    #[test]
    fn truthiness_matches_source_semantics() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(120)));
        assert!(is_truthy(&json!("positive")));
    }
}
