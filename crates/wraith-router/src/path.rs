//! Path pattern matching.
//!
//! Patterns are split on `/` into segments:
//! - `users` matches the literal segment `users` (case-sensitive)
//! - `:id` matches any single segment and binds it to `id`
//! - `*filepath` as the final segment matches every remaining segment,
//!   joined with `/`, and binds it to `filepath`

use std::collections::HashMap;

use crate::error::{Result, RouterError};
use crate::request::PathParams;

/// A segment in a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal string segment.
    Literal(String),
    /// A parameter segment (e.g., `:id`).
    Param(String),
    /// A trailing wildcard segment (e.g., `*filepath`).
    Wildcard(String),
}

/// A parsed path pattern for matching request paths.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The pattern as written.
    pattern: String,
    /// Parsed segments. A wildcard, if present, is always last.
    segments: Vec<PathSegment>,
}

impl PathPattern {
    /// Parses a path pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] when a wildcard segment is not
    /// the final segment of the pattern.
    ///
    /// # Example
    ///
    /// ```
    /// use wraith_router::PathPattern;
    ///
    /// let pattern = PathPattern::parse("/posts/:id/comments/:comment_id").unwrap();
    /// let params = pattern.match_path("/posts/123/comments/456").unwrap();
    /// assert_eq!(params.get("id"), Some("123"));
    /// assert_eq!(params.get("comment_id"), Some("456"));
    /// ```
    pub fn parse(pattern: &str) -> Result<Self> {
        let parts = split_path(pattern);
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            if let Some(name) = part.strip_prefix('*') {
                if i != last {
                    return Err(RouterError::InvalidPattern(format!(
                        "wildcard `{part}` must be the last segment of `{pattern}`"
                    )));
                }
                segments.push(PathSegment::Wildcard(name.to_string()));
            } else if let Some(name) = part.strip_prefix(':') {
                segments.push(PathSegment::Param(name.to_string()));
            } else {
                segments.push(PathSegment::Literal((*part).to_string()));
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Attempts to match a path against this pattern.
    ///
    /// Returns the captured parameters if the path matches. A parameter name
    /// used twice keeps the value of its last occurrence.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        if self.is_static() && self.pattern == path {
            return Some(PathParams::new());
        }

        let parts = split_path(path);
        let (positional, wildcard) = match self.segments.split_last() {
            Some((PathSegment::Wildcard(name), rest)) => (rest, Some(name)),
            _ => (self.segments.as_slice(), None),
        };

        if wildcard.is_some() {
            if parts.len() < positional.len() {
                return None;
            }
        } else if parts.len() != positional.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, part) in positional.iter().zip(&parts) {
            match segment {
                PathSegment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                PathSegment::Param(name) => params.insert(name.as_str(), *part),
                PathSegment::Wildcard(_) => return None,
            }
        }

        if let Some(name) = wildcard {
            params.insert(name.as_str(), parts[positional.len()..].join("/"));
        }

        Some(params)
    }

    /// Returns the pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns true if the pattern has no parameters and no wildcard.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PathSegment::Literal(_)))
    }

    /// Returns the parameter names in declaration order, wildcard included.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                PathSegment::Param(name) | PathSegment::Wildcard(name) => Some(name.as_str()),
                PathSegment::Literal(_) => None,
            })
            .collect()
    }

    /// Generates a path from parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use wraith_router::PathPattern;
    ///
    /// let pattern = PathPattern::parse("/posts/:id").unwrap();
    /// let params: HashMap<String, String> =
    ///     [("id".to_string(), "123".to_string())]
    ///     .into_iter()
    ///     .collect();
    /// assert_eq!(pattern.reverse(&params).unwrap(), "/posts/123");
    /// ```
    pub fn reverse(&self, params: &HashMap<String, String>) -> Option<String> {
        let mut path = String::new();

        for segment in &self.segments {
            match segment {
                PathSegment::Literal(s) if s.is_empty() => continue,
                PathSegment::Literal(s) => {
                    path.push('/');
                    path.push_str(s);
                }
                PathSegment::Param(name) => {
                    path.push('/');
                    path.push_str(params.get(name)?);
                }
                PathSegment::Wildcard(name) => {
                    let rest = params.get(name)?;
                    if !rest.is_empty() {
                        path.push('/');
                        path.push_str(rest.trim_start_matches('/'));
                    }
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }

        Some(path)
    }
}

/// Matches a raw pattern against a path in one step.
///
/// An invalid pattern never matches.
pub fn match_path(pattern: &str, path: &str) -> Option<PathParams> {
    PathPattern::parse(pattern).ok()?.match_path(path)
}

/// Trims leading and trailing slashes and splits on `/`.
///
/// The empty path yields a single empty segment, so `""` and `"/"` are
/// equivalent.
fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> PathPattern {
        PathPattern::parse(p).unwrap()
    }

    #[test]
    fn test_literal_path() {
        let pattern = pattern("/users");
        assert!(pattern.match_path("/users").is_some());
        assert!(pattern.match_path("/users/").is_some());
        assert!(pattern.match_path("/Users").is_none());
        assert!(pattern.match_path("/posts").is_none());
    }

    #[test]
    fn test_single_param() {
        let params = pattern("/users/:id").match_path("/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_param_requires_segment() {
        assert!(pattern("/users/:id").match_path("/users").is_none());
        assert!(pattern("/users/:id").match_path("/users/42/extra").is_none());
    }

    #[test]
    fn test_multiple_params() {
        let params = pattern("/posts/:post_id/comments/:comment_id")
            .match_path("/posts/42/comments/7")
            .unwrap();
        assert_eq!(params.get("post_id"), Some("42"));
        assert_eq!(params.get("comment_id"), Some("7"));
    }

    #[test]
    fn test_wildcard_param() {
        let params = pattern("/static/*filepath")
            .match_path("/static/css/app.css")
            .unwrap();
        assert_eq!(params.get("filepath"), Some("css/app.css"));
    }

    #[test]
    fn test_wildcard_with_nothing_remaining() {
        let params = pattern("/static/*filepath").match_path("/static").unwrap();
        assert_eq!(params.get("filepath"), Some(""));

        let params = pattern("/static/*filepath").match_path("/static/").unwrap();
        assert_eq!(params.get("filepath"), Some(""));
    }

    #[test]
    fn test_wildcard_requires_prefix() {
        assert!(pattern("/static/*filepath").match_path("/public/a.css").is_none());
    }

    #[test]
    fn test_wildcard_must_be_last() {
        let err = PathPattern::parse("/files/*path/edit").unwrap_err();
        assert!(matches!(err, RouterError::InvalidPattern(_)));
    }

    #[test]
    fn test_empty_pattern_and_path() {
        assert!(pattern("").match_path("").is_some());
        assert!(pattern("/").match_path("/").is_some());
        assert!(pattern("/").match_path("").is_some());
        assert!(pattern("/").match_path("/users").is_none());
    }

    #[test]
    fn test_literal_pattern_text_is_not_a_fast_path_for_params() {
        // A parameterized pattern still binds even when the path spells it out.
        let params = pattern("/users/:id").match_path("/users/:id").unwrap();
        assert_eq!(params.get("id"), Some(":id"));
    }

    #[test]
    fn test_duplicate_param_last_wins() {
        let params = pattern("/a/:x/b/:x").match_path("/a/1/b/2").unwrap();
        assert_eq!(params.get("x"), Some("2"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let pattern = pattern("/teams/:team/*rest");
        let first = pattern.match_path("/teams/red/a/b").unwrap();
        for _ in 0..10 {
            let again = pattern.match_path("/teams/red/a/b").unwrap();
            assert_eq!(again.get("team"), first.get("team"));
            assert_eq!(again.get("rest"), first.get("rest"));
        }
    }

    #[test]
    fn test_param_names() {
        assert_eq!(
            pattern("/teams/:team/files/*rest").param_names(),
            vec!["team", "rest"]
        );
        assert!(pattern("/health").is_static());
    }

    #[test]
    fn test_match_path_helper() {
        assert!(match_path("/users/:id", "/users/7").is_some());
        assert!(match_path("/*a/b", "/x/b").is_none());
    }

    #[test]
    fn test_reverse() {
        let params: HashMap<String, String> = [("id".to_string(), "123".to_string())]
            .into_iter()
            .collect();
        assert_eq!(
            pattern("/posts/:id").reverse(&params),
            Some("/posts/123".to_string())
        );
        assert_eq!(pattern("/").reverse(&HashMap::new()), Some("/".to_string()));
    }

    #[test]
    fn test_reverse_missing_param() {
        assert!(pattern("/posts/:id").reverse(&HashMap::new()).is_none());
    }
}
