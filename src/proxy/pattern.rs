//! Wildcard host patterns used by the non-proxy host list.
//!
//! A pattern may start and/or end with a single `*`. Everything else is
//! compared literally and case-sensitively, so an interior `*` only ever
//! matches a literal asterisk.

/// Returns true if `hostname` matches `pattern`.
///
/// - `""` never matches
/// - `"*"` always matches
/// - `"*inner*"` matches hostnames containing `inner`
/// - `"*suffix"` matches hostnames ending with `suffix`
/// - `"prefix*"` matches hostnames starting with `prefix`
/// - anything else must equal the hostname exactly
pub fn matches(hostname: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    if pattern == "*" {
        return true;
    }

    if let Some(rest) = pattern.strip_prefix('*') {
        if let Some(inner) = rest.strip_suffix('*') {
            return hostname.contains(inner);
        }
        return hostname.ends_with(rest);
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return hostname.starts_with(prefix);
    }

    pattern == hostname
}

/// Splits a `|`-separated pattern list, trimming each entry.
///
/// Empty entries are kept; they never match anything.
pub fn split_patterns(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }
    list.split('|').map(|p| p.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!matches("", ""));
        assert!(!matches("test", ""));
    }

    #[test]
    fn test_single_wildcard_matches_everything() {
        assert!(matches("", "*"));
        assert!(matches("test", "*"));
    }

    #[test]
    fn test_trailing_wildcard_is_prefix_match() {
        assert!(matches("test", "test*"));
        assert!(matches("test", "tes*"));
        assert!(matches("test", "t*"));
        assert!(!matches("test", "est*"));
    }

    #[test]
    fn test_leading_wildcard_is_suffix_match() {
        assert!(matches("test", "*test"));
        assert!(matches("test", "*est"));
        assert!(matches("test", "*t"));
        assert!(!matches("test", "*tes"));
    }

    #[test]
    fn test_wildcards_on_both_ends_are_substring_match() {
        assert!(matches("test", "**"));
        assert!(matches("test", "*test*"));
        assert!(matches("test", "*t*"));
        assert!(matches("test", "*es*"));
        assert!(matches("test", "*tes*"));
        assert!(matches("test", "*est*"));
        assert!(matches("test", "*st*"));
        assert!(!matches("test", "*se*"));
    }

    #[test]
    fn test_literal_pattern_is_exact_match() {
        assert!(matches("test", "test"));
        assert!(!matches("test", "est"));
        assert!(!matches("test", "tes"));
        assert!(!matches("test", "es"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert!(!matches("test", "Test"));
        assert!(!matches("Test", "test"));
        assert!(!matches("test", "T*"));
        assert!(!matches("Test", "t*"));
        assert!(!matches("test", "*T"));
        assert!(!matches("tesT", "*t"));
    }

    #[test]
    fn test_interior_asterisk_is_literal() {
        assert!(!matches("test", "t*t"));
        assert!(matches("t*t", "t*t"));
    }

    #[test]
    fn test_repeated_asterisks() {
        assert!(!matches("test", "t**"));
        assert!(!matches("test", "**t"));
        assert!(!matches("test", "***"));
        assert!(matches("t*t", "***"));
        assert!(matches("t*t", "t**"));
        assert!(matches("t*t", "**t"));
    }

    #[test]
    fn test_split_patterns_trims_entries() {
        assert_eq!(
            split_patterns("example.com | *.test.org|"),
            vec!["example.com", "*.test.org", ""]
        );
        assert!(split_patterns("   ").is_empty());
    }
}
