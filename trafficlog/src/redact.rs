//! Ignore-set redaction for request/response payloads.
//!
//! ```
//! use std::collections::BTreeSet;
//! use serde_json::json;
//! use trafficlog::redact::strip_ignored;
//!
//! let ignores = BTreeSet::from(["password".to_string()]);
//! let mut body = json!({"user": "alice", "password": "hunter2"});
//! assert_eq!(strip_ignored(&mut body, &ignores), 1);
//! assert_eq!(body, json!({"user": "alice"}));
//! ```

use serde_json::Value;
use std::collections::BTreeSet;

/// Remove every object key named in `ignores`, at any depth.
///
/// Returns the number of keys removed. Scalars are left as they are.
pub fn strip_ignored(value: &mut Value, ignores: &BTreeSet<String>) -> usize {
    if ignores.is_empty() {
        return 0;
    }
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|k, _| !ignores.contains(k));
            let mut count = before - map.len();
            for v in map.values_mut() {
                count += strip_ignored(v, ignores);
            }
            count
        }
        Value::Array(items) => items.iter_mut().map(|v| strip_ignored(v, ignores)).sum(),
        _ => 0,
    }
}
