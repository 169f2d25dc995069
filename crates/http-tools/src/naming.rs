//! Tool naming helpers shared by the route and OpenAPI import paths.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static PATH_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^}]+)\}|:([A-Za-z0-9_]+)").expect("path param pattern is valid")
});

/// Normalize a free-form label into a tool name: lowercase `[a-z0-9_]`, no leading/trailing or
/// repeated underscores. Returns `"tool"` when nothing usable is left.
#[must_use]
pub fn slugify_tool_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;
    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        "tool".to_string()
    } else {
        out
    }
}

/// Reserve a name that does not collide with `taken`, appending `_2`, `_3`, ... as needed.
///
/// The returned name is inserted into `taken`.
pub fn reserve_unique_tool_name(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Fallback label for a tool that has neither an explicit name nor a summary.
#[must_use]
pub fn method_path_label(method: &str, path: &str) -> String {
    format!("{}_{}", method.to_ascii_uppercase(), path)
}

/// Parameter names referenced by a path template, in first-seen order without duplicates.
///
/// Both `{name}` and `:name` forms are recognized; the optional marker of `:name?` is not part
/// of the name.
#[must_use]
pub fn extract_path_params(path: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in PATH_PARAM.captures_iter(path) {
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let name = name.as_str().trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            out.push(name.to_string());
        }
    }
    out
}
