use serde_json::Value;

use super::display_value;

/// Print just the key answer.
///
/// Looks for well-known fields in priority order, first in the `result`
/// envelope and then in a `summary` block, falling back to the first field.
pub fn print_minimal(value: &Value) {
    let root = value.as_object().and_then(|m| m.get("result")).unwrap_or(value);
    let scope = root.as_object().and_then(|m| m.get("summary")).unwrap_or(root);

    let priority_keys = [
        "present_value",
        "implied_discount_percent",
        "remaining_to_allocate",
        "valid",
        "total_present_value",
        "negotiated_total",
    ];

    for candidate in [scope, root] {
        if let Value::Object(map) = candidate {
            for key in &priority_keys {
                if let Some(val) = map.get(*key) {
                    if !val.is_null() {
                        println!("{}", display_value(val));
                        return;
                    }
                }
            }
        }
    }

    if let Value::Object(map) = root {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, display_value(val));
            return;
        }
    }

    println!("{}", display_value(root));
}
