//! MCP tool annotations derived from the HTTP method a tool calls.

use rmcp::model::ToolAnnotations;

/// Annotation hints for a tool that issues `method`.
///
/// `openWorldHint` is always set: every tool talks to an external system. Methods outside the
/// standard set only get that hint. PATCH leaves idempotence unset.
#[must_use]
pub fn annotations_for_method(method: &str) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method.trim().to_ascii_uppercase().as_str()
    {
        "GET" | "HEAD" | "OPTIONS" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::annotations_for_method;

    #[test]
    fn every_method_is_open_world() {
        for m in ["GET", "post", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "PROPFIND"] {
            assert_eq!(annotations_for_method(m).open_world_hint, Some(true), "{m}");
        }
    }

    #[test]
    fn get_is_read_only_and_idempotent() {
        let a = annotations_for_method("get");
        assert_eq!(a.read_only_hint, Some(true));
        assert_eq!(a.destructive_hint, Some(false));
        assert_eq!(a.idempotent_hint, Some(true));
    }

    #[test]
    fn patch_leaves_idempotence_unknown() {
        let a = annotations_for_method("PATCH");
        assert_eq!(a.destructive_hint, Some(true));
        assert_eq!(a.idempotent_hint, None);
    }

    #[test]
    fn unknown_method_only_sets_open_world() {
        let a = annotations_for_method("PROPFIND");
        assert_eq!(a.read_only_hint, None);
        assert_eq!(a.destructive_hint, None);
        assert_eq!(a.idempotent_hint, None);
    }
}
