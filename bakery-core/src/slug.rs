/// Derive a pie slug from a human name: lowercase, replace non-alphanumerics
/// with `-`, collapse/trim leading and trailing `-`, truncate to 32 chars.
///
/// Returns an empty string if nothing survives (e.g. `"***"`); callers must
/// reject that with a validation error.
pub fn derive_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut replaced = String::with_capacity(lowered.len());
    let mut last_was_dash = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            replaced.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            replaced.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = replaced.trim_matches('-');
    let truncated: String = trimmed.chars().take(32).collect();
    truncated.trim_matches('-').to_string()
}

/// Validate a slug matches `^[a-z0-9-]+$`, is non-empty, and is at most 32 chars.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 32
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate a resource key matches `^[a-z0-9][a-z0-9-]*$` and is at most 64 chars.
pub fn is_valid_resource_key(key: &str) -> bool {
    if key.is_empty() || key.len() > 64 {
        return false;
    }
    let mut chars = key.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_example() {
        assert_eq!(derive_slug(" Hello, World! "), "hello-world");
    }

    #[test]
    fn all_punctuation_yields_empty() {
        assert_eq!(derive_slug("***"), "");
    }

    #[test]
    fn truncates_to_32_chars() {
        let long = "a".repeat(50);
        assert_eq!(derive_slug(&long).len(), 32);
    }

    #[test]
    fn trims_dashes_after_truncation() {
        // 32 'a's then a run of dashes; truncating mid-run must still trim.
        let name = format!("{}{}", "a".repeat(31), "-- --b");
        let slug = derive_slug(&name);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn valid_slug_rules() {
        assert!(is_valid_slug("my-app"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("My-App"));
        assert!(!is_valid_slug(&"a".repeat(33)));
    }

    #[test]
    fn valid_resource_key_rules() {
        assert!(is_valid_resource_key("r1"));
        assert!(is_valid_resource_key("web-app"));
        assert!(!is_valid_resource_key("-web"));
        assert!(!is_valid_resource_key(""));
        assert!(!is_valid_resource_key(&"a".repeat(65)));
    }
}
