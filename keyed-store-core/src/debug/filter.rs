//! Field name filtering with glob patterns

use serde::{Deserialize, Serialize};

/// Include/exclude filter over field names.
///
/// Patterns support `*` (any run of characters) and `?` (one character).
///
/// ```
/// use keyed_store_core::debug::FieldFilter;
///
/// let filter = FieldFilter::new(Some("user.*,count"), Some("user.password"));
/// assert!(filter.should_log_field("user.name"));
/// assert!(filter.should_log_field("count"));
/// assert!(!filter.should_log_field("user.password"));
/// assert!(!filter.should_log_field("cursor"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    /// If non-empty, only fields matching one of these are logged
    pub include_patterns: Vec<String>,
    /// Fields matching these are never logged (applied after include)
    pub exclude_patterns: Vec<String>,
}

fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

impl FieldFilter {
    /// Build from comma-separated pattern lists
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
        }
    }

    /// Build from pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Whether a single field passes the filter
    pub fn should_log_field(&self, field: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| glob_match(p, field))
        {
            return false;
        }
        !self.exclude_patterns.iter().any(|p| glob_match(p, field))
    }

    /// Whether a dispatch touching `fields` should be logged.
    ///
    /// True when any field passes. A dispatch with no fields is logged only
    /// when there are no include patterns.
    pub fn should_log<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        let mut fields = fields.into_iter().peekable();
        if fields.peek().is_none() {
            return self.include_patterns.is_empty();
        }
        fields.any(|f| self.should_log_field(f))
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                // Let the last star swallow one more character
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    backtrack = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("count", "count"));
        assert!(!glob_match("count", "counter"));
        assert!(!glob_match("count", "amount"));
    }

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("user.*", "user.name"));
        assert!(glob_match("user.*", "user."));
        assert!(!glob_match("user.*", "account.user.name"));
        assert!(glob_match("*.name", "user.name"));
        assert!(glob_match("*name*", "first_name_raw"));
        assert!(glob_match("a*b*c", "aXbYbZc"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("row?", "row1"));
        assert!(!glob_match("row?", "row"));
        assert!(!glob_match("row?", "row12"));
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let filter = FieldFilter::new(Some("cursor*, selection"), Some("cursor_blink"));
        assert!(filter.should_log_field("cursor_x"));
        assert!(filter.should_log_field("selection"));
        assert!(!filter.should_log_field("cursor_blink"));
        assert!(!filter.should_log_field("count"));
    }

    #[test]
    fn test_filter_default_logs_everything() {
        let filter = FieldFilter::default();
        assert!(filter.should_log(["anything"]));
        assert!(filter.should_log(std::iter::empty()));
    }

    #[test]
    fn test_dispatch_logged_when_any_field_passes() {
        let filter = FieldFilter::new(None, Some("tick"));
        assert!(!filter.should_log(["tick"]));
        assert!(filter.should_log(["tick", "count"]));

        let filter = FieldFilter::new(Some("count"), None);
        assert!(!filter.should_log(std::iter::empty()));
    }
}
