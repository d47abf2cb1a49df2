//! Assignment extraction from captured response bodies

use serde_json::Value;

/// Keys naming the assigned facility, highest priority first
pub const ASSIGNMENT_ALIASES: &[&str] = &[
    "assignedMedicalCenter",
    "medical_center",
    "medicalCenter",
    "clinic_name",
    "center_name",
    "hospital_name",
    "assigned_center",
    "appointment_center",
    "clinic",
    "center",
    "hospital",
];

/// Nesting deeper than this is not searched
pub const MAX_SEARCH_DEPTH: usize = 32;

/// Find the assigned facility name in a response body
///
/// Aliases are tried in priority order across the whole body, so a higher-priority key
/// nested deep wins over a lower-priority one at the top. Each alias is looked up
/// depth-first with object values and array items in document order. Only non-empty
/// scalars count.
pub fn extract_assignment(body: &Value) -> Option<String> {
    ASSIGNMENT_ALIASES
        .iter()
        .find_map(|alias| find_key(body, alias, 0))
}

fn find_key(value: &Value, alias: &str, depth: usize) -> Option<String> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => map
            .get(alias)
            .and_then(scalar_text)
            .or_else(|| map.values().find_map(|child| find_key(child, alias, depth + 1))),
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_key(child, alias, depth + 1)),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_alias() {
        let body = json!({"status": "ok", "medical_center": "Green Crescent"});
        assert_eq!(extract_assignment(&body), Some("Green Crescent".to_string()));
    }

    #[test]
    fn test_alias_priority_within_object() {
        let body = json!({"center": "Low Priority", "assignedMedicalCenter": "High Priority"});
        assert_eq!(extract_assignment(&body), Some("High Priority".to_string()));
    }

    #[test]
    fn test_alias_priority_spans_nesting_levels() {
        let body = json!({
            "center": "Riyadh Region",
            "data": {"assignedMedicalCenter": "Green Crescent"}
        });
        assert_eq!(extract_assignment(&body), Some("Green Crescent".to_string()));
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let body = json!({
            "data": {
                "slots": [
                    {"time": "09:00"},
                    {"details": {"clinic_name": "  Al-Noor Clinic  "}}
                ]
            }
        });
        assert_eq!(extract_assignment(&body), Some("Al-Noor Clinic".to_string()));
    }

    #[test]
    fn test_empty_and_container_values_are_skipped() {
        let body = json!({
            "medical_center": "",
            "center": {"name": "nested object is not a value"},
            "result": {"hospital": "Fallback Hospital"}
        });
        assert_eq!(
            extract_assignment(&body),
            Some("Fallback Hospital".to_string())
        );
    }

    #[test]
    fn test_no_alias_found() {
        assert_eq!(extract_assignment(&json!({"status": "queued"})), None);
        assert_eq!(extract_assignment(&json!("Green Crescent")), None);
        assert_eq!(extract_assignment(&Value::Null), None);
    }

    #[test]
    fn test_depth_bound() {
        let mut body = json!({"center": "Too Deep"});
        for _ in 0..(MAX_SEARCH_DEPTH + 5) {
            body = json!({"wrap": body});
        }
        assert_eq!(extract_assignment(&body), None);

        let mut body = json!({"center": "Reachable"});
        for _ in 0..MAX_SEARCH_DEPTH {
            body = json!({"wrap": body});
        }
        assert_eq!(extract_assignment(&body), Some("Reachable".to_string()));
    }
}
