//! Visible path prefix derived from a payload's `slug` field.

/// Reduce `slug` to lowercase ASCII alphanumerics separated by single hyphens.
///
/// Every maximal run of characters outside `[A-Za-z0-9]` becomes one `-`, and
/// leading or trailing hyphens are dropped. A slug with no alphanumerics yields
/// an empty string.
pub fn sanitize(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut gap = false;
    for c in slug.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('-');
            }
            gap = false;
            out.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_and_lowercases() {
        assert_eq!(sanitize("Hello, World!! 2024"), "hello-world-2024");
        assert_eq!(sanitize("Promo!!"), "promo");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(sanitize("--spring--sale--"), "spring-sale");
        assert_eq!(sanitize("  x  "), "x");
    }

    #[test]
    fn empty_or_symbol_only_yields_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("!!! ???"), "");
    }

    #[test]
    fn non_ascii_counts_as_separator() {
        assert_eq!(sanitize("café au lait"), "caf-au-lait");
    }
}
