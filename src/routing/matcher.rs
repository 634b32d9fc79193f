//! Route matching logic.
//!
//! # Responsibilities
//! - Match request paths against route prefixes
//! - Pick the most specific route (longest matching prefix)
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - "/" matches everything; otherwise a prefix matches on exact equality
//!   or at a path-segment boundary, never mid-segment
//! - No regex, O(routes) scan per request

use crate::config::Route;

/// Strip any query string from a request path.
pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Extract the query string, if any.
pub fn query_string(path: &str) -> Option<&str> {
    path.find('?').map(|idx| &path[idx + 1..])
}

/// True when `prefix` matches `path` under the routing rules.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" || path == prefix {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Select the route with the longest matching prefix, if any.
pub fn match_route<'a>(routes: &'a [Route], path: &str) -> Option<&'a Route> {
    routes
        .iter()
        .filter(|r| prefix_matches(&r.path, path))
        .max_by_key(|r| r.path.len())
}

/// The request path with the matched prefix removed, always "/"-prefixed.
pub fn strip_route_prefix<'a>(route: &Route, path: &'a str) -> &'a str {
    if route.path == "/" {
        return path;
    }
    match path.strip_prefix(route.path.as_str()) {
        Some("") => "/",
        Some(rest) => rest,
        None => path,
    }
}
