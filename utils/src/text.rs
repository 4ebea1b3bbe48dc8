//! Text normalization for diacritic-insensitive search.

use unicode_normalization::UnicodeNormalization;

/// Fold a string for matching: NFKD-decompose, drop combining marks,
/// lowercase. `"Pâté"` and `"pate"` normalize identically.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize("Pâté"), "pate");
        assert_eq!(normalize("Ångström"), "angstrom");
        assert_eq!(normalize("naïve"), "naive");
    }

    #[test]
    fn test_lowercases() {
        assert_eq!(normalize("ELECTORAL College"), "electoral college");
    }

    #[test]
    fn test_plain_ascii_unchanged() {
        assert_eq!(normalize("cats or dogs"), "cats or dogs");
    }
}
