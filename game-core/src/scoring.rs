use std::collections::HashMap;

pub struct ScoringEngine;

impl ScoringEngine {
    /// Count of letters shared between secret and guess, with multiplicity
    /// capped at the smaller frequency. A secret with one E and a guess
    /// with two E's contributes 1, not 2.
    pub fn common_letter_count(secret: &str, guess: &str) -> u8 {
        let secret_counts = Self::letter_frequencies(secret);
        let guess_counts = Self::letter_frequencies(guess);

        let mut common = 0u32;
        for (letter, guess_count) in &guess_counts {
            let secret_count = secret_counts.get(letter).copied().unwrap_or(0);
            common += (*guess_count).min(secret_count);
        }
        common as u8
    }

    /// Case-insensitive full equality.
    pub fn is_exact_match(secret: &str, guess: &str) -> bool {
        secret.eq_ignore_ascii_case(guess)
    }

    fn letter_frequencies(word: &str) -> HashMap<char, u32> {
        let mut counts = HashMap::new();
        for ch in word.to_lowercase().chars() {
            *counts.entry(ch).or_insert(0) += 1;
        }
        counts
    }
}
