//! Text similarity kernel. All metrics operate on normalized strings and
//! code points, never raw bytes, so non-ASCII titles score correctly.

use std::collections::{HashMap, HashSet};

/// Words dropped during normalization.
const STOP_WORDS: [&str; 14] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercase, strip stop words and punctuation, collapse whitespace.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|word| !is_stop_word(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Combined similarity of two titles in [0, 1].
///
/// Equal normalized strings short-circuit to 1.0. Otherwise the score is
/// `0.4·JaroWinkler + 0.3·cosine + 0.2·Jaccard + 0.1·LCS`, with a +0.1 bonus
/// each for Soundex and Metaphone agreement, capped at 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = normalize(a);
    let right = normalize(b);

    if left == right {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let mut score = 0.4 * strsim::jaro_winkler(&left, &right)
        + 0.3 * cosine(&left, &right)
        + 0.2 * jaccard(&left, &right)
        + 0.1 * lcs_ratio(&left, &right);

    if soundex(&left) == soundex(&right) {
        score += 0.1;
    }
    if metaphone(&left) == metaphone(&right) {
        score += 0.1;
    }

    score.min(1.0)
}

/// Normalized Levenshtein similarity. Used for version strings, where edit
/// distance tracks release proximity better than token overlap.
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Cosine similarity over word-frequency vectors. No support for empty
/// operands: either side empty scores 0.0.
pub fn cosine(a: &str, b: &str) -> f64 {
    let left = word_frequencies(a);
    let right = word_frequencies(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let dot: f64 = left
        .iter()
        .filter_map(|(word, count)| right.get(word).map(|other| (count * other) as f64))
        .sum();
    let norm_left: f64 = left.values().map(|c| (c * c) as f64).sum::<f64>().sqrt();
    let norm_right: f64 = right.values().map(|c| (c * c) as f64).sum::<f64>().sqrt();

    if norm_left == 0.0 || norm_right == 0.0 {
        return 0.0;
    }
    dot / (norm_left * norm_right)
}

/// Jaccard index over word sets. Either side empty scores 0.0.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

/// Longest-common-subsequence length over the longer operand. Both sides
/// empty score 1.0.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let left: Vec<char> = a.chars().collect();
    let right: Vec<char> = b.chars().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    // One-row DP over code points.
    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];
    for lc in &left {
        for (j, rc) in right.iter().enumerate() {
            current[j + 1] = if lc == rc {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()] as f64 / left.len().max(right.len()) as f64
}

/// Classic four-character Soundex code of the ASCII-alphabetic content.
/// Non-ASCII input yields an empty code, which never matches a non-empty one.
pub fn soundex(input: &str) -> String {
    let letters: Vec<char> = input
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let Some(first) = letters.first() else {
        return String::new();
    };

    let digit = |c: char| -> Option<char> {
        match c {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    };

    let mut code = String::with_capacity(4);
    code.push(*first);
    let mut last_digit = digit(*first);

    for c in letters.iter().skip(1) {
        let d = digit(*c);
        match d {
            Some(d) if Some(d) != last_digit => {
                code.push(d);
                if code.len() == 4 {
                    break;
                }
            }
            _ => {}
        }
        // H and W are transparent to adjacency; vowels reset it.
        if !matches!(c, 'H' | 'W') {
            last_digit = d;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

/// Compact Metaphone-style phonetic key. Covers the common English digraph
/// rules; enough to add signal on top of Soundex without chasing every edge.
pub fn metaphone(input: &str) -> String {
    let letters: Vec<char> = input
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return String::new();
    }

    let mut key = String::new();
    let mut i = 0usize;
    let len = letters.len();
    let at = |idx: usize| letters.get(idx).copied();

    while i < len && key.len() < 8 {
        let c = letters[i];
        let next = at(i + 1);
        let prev = if i > 0 { at(i - 1) } else { None };

        // Skip doubled letters except C.
        if prev == Some(c) && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    key.push(c);
                }
            }
            'B' => {
                // Silent terminal B after M (lamb).
                if !(i + 1 == len && prev == Some('M')) {
                    key.push('B');
                }
            }
            'C' => {
                if next == Some('H') {
                    key.push('X');
                    i += 1;
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    key.push('S');
                } else {
                    key.push('K');
                }
            }
            'D' => {
                if next == Some('G') && matches!(at(i + 2), Some('E') | Some('I') | Some('Y')) {
                    key.push('J');
                    i += 1;
                } else {
                    key.push('T');
                }
            }
            'G' => {
                if next == Some('H') {
                    // GH is silent unless initial.
                    if i == 0 {
                        key.push('K');
                    }
                    i += 1;
                } else if next == Some('N') {
                    // GN as in gnome: silent G.
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    key.push('J');
                } else {
                    key.push('K');
                }
            }
            'H' => {
                // H is audible only between vowel and consonant boundaries.
                if prev.is_none_or(is_vowel) && next.is_some_and(is_vowel) {
                    key.push('H');
                }
            }
            'K' => {
                if !(i == 0 && next == Some('N')) && prev != Some('C') {
                    key.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    key.push('F');
                    i += 1;
                } else {
                    key.push('P');
                }
            }
            'Q' => key.push('K'),
            'S' => {
                if next == Some('H') {
                    key.push('X');
                    i += 1;
                } else {
                    key.push('S');
                }
            }
            'T' => {
                if next == Some('H') {
                    key.push('0');
                    i += 1;
                } else {
                    key.push('T');
                }
            }
            'V' => key.push('F'),
            'W' | 'Y' => {
                if next.is_some_and(is_vowel) {
                    key.push(c);
                }
            }
            'X' => key.push_str("KS"),
            'Z' => key.push('S'),
            _ => key.push(c),
        }

        i += 1;
    }

    key
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

fn word_frequencies(input: &str) -> HashMap<&str, u32> {
    let mut freq = HashMap::new();
    for word in input.split_whitespace() {
        *freq.entry(word).or_insert(0) += 1;
    }
    freq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_noise() {
        assert_eq!(normalize("The Lord of the Rings!"), "lord rings");
        assert_eq!(normalize("  AC/DC:   Back   in Black "), "acdc back black");
        assert_eq!(normalize("The A An And"), "");
    }

    #[test]
    fn identical_strings_score_one_on_every_metric() {
        let s = "abbey road";
        assert_eq!(similarity(s, s), 1.0);
        assert_eq!(strsim::jaro_winkler(s, s), 1.0);
        assert_eq!(cosine(s, s), 1.0);
        assert_eq!(jaccard(s, s), 1.0);
        assert_eq!(lcs_ratio(s, s), 1.0);
        assert_eq!(levenshtein_ratio(s, s), 1.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("The Matrix", "Matrix Reloaded"),
            ("Abbey Road", "Abby Road"),
            ("Dune", "Dune Part Two"),
            ("東京物語", "Tokyo Story"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn stop_words_do_not_separate_titles() {
        assert_eq!(similarity("The Beatles", "Beatles"), 1.0);
        assert_eq!(similarity("Lord of the Rings", "The Lord of the Rings"), 1.0);
    }

    #[test]
    fn empty_operand_rules() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("something", ""), 0.0);
        assert_eq!(cosine("", ""), 0.0);
        assert_eq!(jaccard("", ""), 0.0);
        assert_eq!(lcs_ratio("", ""), 1.0);
        assert_eq!(lcs_ratio("abc", ""), 0.0);
        assert_eq!(levenshtein_ratio("", ""), 1.0);
    }

    #[test]
    fn near_misses_score_high_but_below_one() {
        let score = similarity("Abbey Road", "Abby Road");
        assert!(score > 0.8, "got {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn unrelated_titles_score_low() {
        let score = similarity("Abbey Road", "Kind of Blue");
        assert!(score < 0.5, "got {score}");
    }

    #[test]
    fn soundex_reference_codes() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Tymczak"), "T522");
        assert_eq!(soundex("Honeyman"), "H555");
        assert_eq!(soundex(""), "");
    }

    #[test]
    fn metaphone_groups_homophones() {
        assert_eq!(metaphone("night"), metaphone("nite"));
        assert_eq!(metaphone("phish"), metaphone("fish"));
        assert_ne!(metaphone("cat"), metaphone("dog"));
        assert_eq!(metaphone(""), "");
    }

    #[test]
    fn lcs_handles_multibyte_code_points() {
        // Byte-indexed implementations panic or misbehave here.
        assert!(lcs_ratio("日本語", "日本") > 0.6);
        assert_eq!(lcs_ratio("日本語", "日本語"), 1.0);
    }
}
