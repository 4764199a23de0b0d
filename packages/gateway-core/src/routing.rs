//! HTTP method + path-pattern matching, producing the function name and
//! extracted path parameters for a request.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct RouteError(String);

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route pattern: {}", self.0)
    }
}

impl std::error::Error for RouteError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A method + path pattern bound to a function name. Patterns use
/// `{name}` placeholders, e.g. `/items/{id}`.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: String,
    pub pattern: String,
    pub function: String,
    segments: Vec<Segment>,
}

/// The result of a successful [`Route::matches`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub function: String,
    pub params: HashMap<String, String>,
    /// The route's pattern, used as API Gateway's `resource` field.
    pub resource: String,
}

impl Route {
    pub fn new(method: &str, pattern: &str, function: &str) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError(format!("pattern {pattern} must start with /")));
        }

        let mut segments = Vec::new();
        let mut seen_params = std::collections::HashSet::new();
        for raw in pattern.trim_start_matches('/').split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(RouteError(format!("empty placeholder in {pattern}")));
                }
                if !seen_params.insert(name.to_string()) {
                    return Err(RouteError(format!("duplicate placeholder {{{name}}} in {pattern}")));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }

        Ok(Self {
            method: method.to_ascii_uppercase(),
            pattern: pattern.to_string(),
            function: function.to_string(),
            segments,
        })
    }

    /// Match `method`/`path` against this route. `path` is split the same
    /// way the pattern was; a trailing slash is ignored.
    pub fn matches(&self, method: &str, path: &str) -> Option<RouteMatch> {
        if !self.method.eq_ignore_ascii_case(method) {
            return None;
        }

        let parts: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }

        Some(RouteMatch {
            function: self.function.clone(),
            params,
            resource: self.pattern.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_route_matches_exact_path() {
        let route = Route::new("GET", "/health", "health").unwrap();
        assert!(route.matches("GET", "/health").is_some());
        assert!(route.matches("GET", "/health/").is_some());
        assert!(route.matches("POST", "/health").is_none());
        assert!(route.matches("GET", "/healthz").is_none());
    }

    #[test]
    fn placeholder_route_extracts_params() {
        let route = Route::new("GET", "/items/{id}", "items").unwrap();
        let matched = route.matches("GET", "/items/42").unwrap();
        assert_eq!(matched.function, "items");
        assert_eq!(matched.params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let route = Route::new("get", "/health", "health").unwrap();
        assert!(route.matches("GET", "/health").is_some());
    }

    #[test]
    fn rejects_pattern_without_leading_slash() {
        assert!(Route::new("GET", "items", "items").is_err());
    }

    #[test]
    fn rejects_duplicate_placeholder_names() {
        assert!(Route::new("GET", "/items/{id}/{id}", "items").is_err());
    }

    #[test]
    fn segment_count_mismatch_does_not_match() {
        let route = Route::new("GET", "/items/{id}", "items").unwrap();
        assert!(route.matches("GET", "/items/42/extra").is_none());
        assert!(route.matches("GET", "/items").is_none());
    }
}
