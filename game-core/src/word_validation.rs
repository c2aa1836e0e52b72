pub const WORD_LENGTH: usize = 5;

/// Check that a word is exactly 5 characters, all alphabetic.
/// Case-insensitive: mixed-case words are accepted.
pub fn validate_word_format(word: &str) -> bool {
    let word = word.trim();
    word.chars().count() == WORD_LENGTH && word.chars().all(|c| c.is_alphabetic())
}

/// Canonical form used everywhere a word is stored or compared.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_five_letter_words() {
        assert!(validate_word_format("HOUSE"));
        assert!(validate_word_format("house"));
        assert!(validate_word_format("HoUsE"));
        assert!(validate_word_format("  mouse  ")); // surrounding whitespace trimmed
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(!validate_word_format(""));
        assert!(!validate_word_format("HOME"));
        assert!(!validate_word_format("HOUSES"));
    }

    #[test]
    fn test_rejects_non_alphabetic() {
        assert!(!validate_word_format("h0use"));
        assert!(!validate_word_format("ho-se"));
        assert!(!validate_word_format("hou e"));
        assert!(!validate_word_format("hou5e"));
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word(" house "), "HOUSE");
        assert_eq!(normalize_word("MoUsE"), "MOUSE");
    }
}
