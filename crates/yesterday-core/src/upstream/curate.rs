//! Merging event lists from several sources into one feed.

use std::collections::HashSet;

use crate::EventRecord;

/// Oldest year a source may plausibly report.
pub const EARLIEST_YEAR: i32 = -3000;

const SIMILARITY_THRESHOLD: f64 = 0.7;
const MIN_WORD_CHARS: usize = 3;

/// Years outside `EARLIEST_YEAR..=current_year` are data errors upstream.
pub fn is_plausible_year(year: i32, current_year: i32) -> bool {
    (EARLIEST_YEAR..=current_year).contains(&year)
}

/// Concatenates `sources` in priority order, drops implausible years and
/// duplicates, sorts by year and keeps at most `limit` events.
///
/// Two events are duplicates when they share a year and their titles are
/// equal after normalization or similar by [`is_similar_title`]. The first
/// occurrence wins, so earlier sources take precedence.
pub fn combine_events(
    sources: Vec<Vec<EventRecord>>,
    current_year: i32,
    limit: usize,
) -> Vec<EventRecord> {
    let mut seen: HashSet<(i32, String)> = HashSet::new();
    let mut kept: Vec<EventRecord> = Vec::new();

    for event in sources.into_iter().flatten() {
        if !is_plausible_year(event.year(), current_year) {
            continue;
        }

        let normalized = event.title().trim().to_lowercase();
        if seen.contains(&(event.year(), normalized.clone())) {
            continue;
        }
        let fuzzy_duplicate = kept.iter().any(|other| {
            other.year() == event.year() && is_similar_title(other.title(), event.title())
        });
        if fuzzy_duplicate {
            continue;
        }

        seen.insert((event.year(), normalized));
        kept.push(event);
    }

    kept.sort_by_key(EventRecord::year);
    kept.truncate(limit);
    kept
}

/// More than 70% of the longer title's significant words (three or more
/// characters, punctuation stripped) also appear in the other title.
pub fn is_similar_title(left: &str, right: &str) -> bool {
    let left = significant_words(left);
    let right = significant_words(right);

    let longest = left.len().max(right.len());
    if longest == 0 {
        return false;
    }

    let common = left.iter().filter(|word| right.contains(word)).count();
    common as f64 / longest as f64 > SIMILARITY_THRESHOLD
}

fn significant_words(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_WORD_CHARS)
        .map(str::to_owned)
        .collect()
}
