//! Typo-tolerant matching over verse text.
//!
//! Scoring is token-based: each query token is matched against the verse's
//! tokens by Levenshtein distance (cutoff 2 edits), scored
//! `1 - distance / max_len`, and the per-token best scores are averaged
//! over all query tokens (an unmatched token contributes zero). Matching is
//! case-insensitive and whitespace-normalized. A query whose tokens all
//! appear verbatim in the verse scores 1.0, so substring queries score at
//! the maximum.

use crate::models::{EngineHit, VerseMeta};

/// Maximum edit distance for a token pair to count as a match.
const MAX_DISTANCE: usize = 2;

/// Default minimum score for a verse to be reported (mirrors the classic
/// 70% similarity cutoff).
pub const DEFAULT_CUTOFF: f64 = 0.7;

/// Levenshtein edit distance over chars, two-row dynamic program.
fn levenshtein(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let s2_chars: Vec<char> = s2.chars().collect();

    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row = vec![0; len2 + 1];

    for (i, c1) in s1.chars().enumerate() {
        curr_row[0] = i + 1;

        for (j, c2) in s2_chars.iter().enumerate() {
            let cost = usize::from(c1 != *c2);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Similarity between a query and one verse text, in `[0.0, 1.0]`.
pub fn fuzzy_score(query: &str, text: &str) -> f64 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokenize(text);

    let mut total = 0.0f64;

    for qt in &query_tokens {
        let qt_len = qt.chars().count();
        let mut best = 0.0f64;

        for tt in &text_tokens {
            // Length-difference pruning: cannot be within MAX_DISTANCE.
            // Compared in chars, the same unit the distance uses.
            let tt_len = tt.chars().count();
            if qt_len.abs_diff(tt_len) > MAX_DISTANCE {
                continue;
            }

            let distance = levenshtein(qt, tt);
            if distance <= MAX_DISTANCE {
                let max_len = qt_len.max(tt_len);
                let score = 1.0 - (distance as f64 / max_len as f64);
                if score > best {
                    best = score;
                }
                if distance == 0 {
                    break;
                }
            }
        }

        total += best;
    }

    // Unmatched query tokens already dilute the average; no further
    // coverage penalty on top.
    total / query_tokens.len() as f64
}

/// Score every verse against `query` and return hits at or above `cutoff`,
/// best first. Never fails; an empty corpus yields an empty list.
pub fn match_verses<'a>(
    query: &str,
    verses: impl IntoIterator<Item = &'a VerseMeta>,
    cutoff: f64,
) -> Vec<EngineHit> {
    let mut hits: Vec<EngineHit> = verses
        .into_iter()
        .filter_map(|v| {
            let score = fuzzy_score(query, &v.text);
            if score >= cutoff {
                Some(EngineHit {
                    verse_id: v.id.clone(),
                    raw_score: score,
                })
            } else {
                None
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::verse_id;

    fn verse(num: i64, text: &str) -> VerseMeta {
        VerseMeta {
            id: verse_id("T", "Book", 1, num),
            translation: "T".to_string(),
            book: "Book".to_string(),
            book_order: 0,
            chapter: 1,
            verse: num,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_substring_query_scores_max() {
        let score = fuzzy_score(
            "love your neighbour",
            "Thou shalt love your neighbour as thyself",
        );
        assert!((score - 1.0).abs() < 1e-9, "got {}", score);
    }

    #[test]
    fn test_typo_heavy_query_survives_default_cutoff() {
        let verses = vec![
            verse(1, "Thou shalt love your neighbour as thyself"),
            verse(2, "And God said, Let there be light"),
        ];
        let hits = match_verses("luv yur neighbr", &verses, DEFAULT_CUTOFF);
        assert!(!hits.is_empty(), "one-edit-per-token query fell below the default cutoff");
        assert_eq!(hits[0].verse_id, "T:Book:1:1");
    }

    #[test]
    fn test_multibyte_tokens_not_pruned_by_byte_length() {
        // "héllö" is 7 bytes but 5 chars; against "hell" the byte-length
        // gap is 3 while the edit distance is only 2.
        let score = fuzzy_score("héllö", "hell fire");
        assert!(score > 0.0, "got {}", score);
    }

    #[test]
    fn test_typo_query_ranks_closest_first() {
        let verses = vec![
            verse(1, "Thou shalt love thy neighbour as thyself"),
            verse(2, "In the beginning God created the heaven and the earth"),
        ];
        let hits = match_verses("luv thy neighbr", &verses, 0.3);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].verse_id, "T:Book:1:1");
    }

    #[test]
    fn test_unrelated_text_below_cutoff() {
        let verses = vec![verse(1, "and the evening and the morning were the first day")];
        let hits = match_verses("zebra quartz", &verses, DEFAULT_CUTOFF);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_empty_corpus_is_empty_not_error() {
        let verses: Vec<VerseMeta> = Vec::new();
        assert!(match_verses("anything", &verses, DEFAULT_CUTOFF).is_empty());
    }

    #[test]
    fn test_scores_bounded() {
        let verses = vec![verse(1, "mercy and truth are met together")];
        for hit in match_verses("mercy truth", &verses, 0.0) {
            assert!(hit.raw_score >= 0.0 && hit.raw_score <= 1.0);
        }
    }
}
