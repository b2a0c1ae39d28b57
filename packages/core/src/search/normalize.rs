//! Text normalisation shared by index builds and queries

/// Normalise a name or query for prefix matching: trimmed and lower-cased
///
/// Index keys and query prefixes go through the same function, which is what
/// makes search case-insensitive.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Length of a normalised prefix in characters (not bytes)
pub fn prefix_len(normalized: &str) -> usize {
    normalized.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_text("  Pomme Rouge "), "pomme rouge");
        assert_eq!(normalize_text("TOM"), "tom");
        assert_eq!(normalize_text("Épices"), "épices");
    }

    #[test]
    fn test_prefix_len_counts_characters() {
        assert_eq!(prefix_len("ép"), 2);
        assert_eq!(prefix_len(""), 0);
    }
}
