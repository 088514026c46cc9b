//! Field extraction from stored records.
//!
//! Records are persisted as JSON, so extraction walks the parsed
//! document rather than any original in-memory type. The walker is
//! opaque to the rest of the core: indexes only see the node it returns.

use crate::selector::Selector;

/// Returns the value at `selector`'s path in `doc`, or `None` when any
/// step of the path is missing or lands on a non-object.
#[must_use]
pub(crate) fn extract<'a>(
    doc: &'a serde_json::Value,
    selector: &Selector,
) -> Option<&'a serde_json::Value> {
    let mut node = doc;
    for field in selector.fields() {
        node = node.as_object()?.get(field)?;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sel(path: &[&str]) -> Selector {
        Selector::new(path.iter().copied()).unwrap()
    }

    #[test]
    fn top_level_field() {
        let doc = json!({"Email": "a@b.com"});
        assert_eq!(extract(&doc, &sel(&["Email"])), Some(&json!("a@b.com")));
    }

    #[test]
    fn nested_field() {
        let doc = json!({"Address": {"ZipCode": 86}});
        assert_eq!(
            extract(&doc, &sel(&["Address", "ZipCode"])),
            Some(&json!(86))
        );
    }

    #[test]
    fn missing_field() {
        let doc = json!({"Email": "a@b.com"});
        assert_eq!(extract(&doc, &sel(&["Age"])), None);
        assert_eq!(extract(&doc, &sel(&["Email", "Domain"])), None);
    }

    #[test]
    fn non_object_midway() {
        let doc = json!({"Address": 42});
        assert_eq!(extract(&doc, &sel(&["Address", "ZipCode"])), None);
    }
}
