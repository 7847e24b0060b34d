//! Readability statistics for policy text.
//!
//! Used to compare an original document with its simplified version.
//!
//! # Algorithm
//!
//! 1. Words are maximal runs of alphanumeric characters (apostrophes kept).
//! 2. Sentences end at `.`, `!` or `?`; trailing text without a terminator
//!    counts as one more sentence.
//! 3. Syllables per word are vowel groups (`aeiouy`), minus one for a silent
//!    trailing `e` (but not `-le`), never fewer than one.
//! 4. Flesch–Kincaid grade =
//!    `0.39 × words/sentences + 11.8 × syllables/words − 15.59`,
//!    floored at 0 and rounded to one decimal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub word_count: usize,
    pub sentence_count: usize,
    pub syllable_count: usize,
    pub grade_level: f64,
}

impl ReadingStats {
    pub fn compute(text: &str) -> Self {
        let words = words(text);
        let word_count = words.len();
        if word_count == 0 {
            return Self {
                word_count: 0,
                sentence_count: 0,
                syllable_count: 0,
                grade_level: 0.0,
            };
        }

        let sentence_count = count_sentences(text).max(1);
        let syllable_count: usize = words.iter().map(|w| count_syllables(w)).sum();

        let wps = word_count as f64 / sentence_count as f64;
        let spw = syllable_count as f64 / word_count as f64;
        let raw = 0.39 * wps + 11.8 * spw - 15.59;
        let grade_level = (raw.max(0.0) * 10.0).round() / 10.0;

        Self {
            word_count,
            sentence_count,
            syllable_count,
            grade_level,
        }
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .collect()
}

fn count_sentences(text: &str) -> usize {
    let mut count = 0;
    let mut pending = false;
    for c in text.chars() {
        if matches!(c, '.' | '!' | '?') {
            if pending {
                count += 1;
                pending = false;
            }
        } else if c.is_alphanumeric() {
            pending = true;
        }
    }
    if pending {
        count += 1;
    }
    count
}

/// Heuristic English syllable count.
pub fn count_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let chars: Vec<char> = lower.chars().filter(|c| c.is_alphabetic()).collect();
    if chars.is_empty() {
        return 0;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut groups = 0;
    let mut prev_vowel = false;
    for &c in &chars {
        let v = is_vowel(c);
        if v && !prev_vowel {
            groups += 1;
        }
        prev_vowel = v;
    }

    let n = chars.len();
    let consonant_le = n >= 3 && chars[n - 2] == 'l' && !is_vowel(chars[n - 3]);
    if groups > 1 && chars[n - 1] == 'e' && !consonant_le {
        groups -= 1;
    }
    groups.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syllables() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("policy"), 3);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("table"), 2);
        assert_eq!(count_syllables("the"), 1);
        assert_eq!(count_syllables("legislation"), 4);
    }

    #[test]
    fn empty_text_is_zero() {
        let stats = ReadingStats::compute("   ");
        assert_eq!(stats.word_count, 0);
        assert_eq!(stats.grade_level, 0.0);
    }

    #[test]
    fn counts_words_and_sentences() {
        let stats = ReadingStats::compute("The cat sat. The dog ran! Did it");
        assert_eq!(stats.word_count, 8);
        assert_eq!(stats.sentence_count, 3);
    }

    #[test]
    fn ellipsis_is_one_sentence_break() {
        let stats = ReadingStats::compute("Wait... then go.");
        assert_eq!(stats.sentence_count, 2);
    }

    #[test]
    fn legal_text_reads_harder_than_plain_text() {
        let legal = ReadingStats::compute(
            "Notwithstanding the aforementioned provisions, data controllers shall implement \
             appropriate technical and organisational measures commensurate with the \
             anticipated processing operations.",
        );
        let plain = ReadingStats::compute("Keep data safe. Only keep what you need. Ask first.");
        assert!(legal.grade_level > plain.grade_level);
        assert!(plain.grade_level >= 0.0);
    }
}
