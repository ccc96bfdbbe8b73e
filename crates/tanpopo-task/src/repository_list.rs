use std::collections::HashSet;

/// Parses a newline-separated `owner/name` list. Blank lines and `#` comments
/// are skipped; duplicates collapse onto their first occurrence.
pub fn parse_repository_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_repository_list;

    #[test]
    fn unit_skips_blank_and_comment_lines() {
        let parsed = parse_repository_list("# fleet\n\nocto/a\n   \n  # octo/hidden\nocto/b\n");
        assert_eq!(parsed, vec!["octo/a", "octo/b"]);
    }

    #[test]
    fn functional_duplicates_keep_first_occurrence_order() {
        let parsed = parse_repository_list("octo/c\nocto/a\nocto/c\n octo/b \nocto/a");
        assert_eq!(parsed, vec!["octo/c", "octo/a", "octo/b"]);
    }

    #[test]
    fn unit_empty_input_yields_empty_list() {
        assert!(parse_repository_list("").is_empty());
        assert!(parse_repository_list("\n# only comments\n").is_empty());
    }
}
