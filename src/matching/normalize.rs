use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;

/// Separators seen between artist names in display strings
/// ("Dua Lipa, DaBaby", "Calvin Harris & Disciples", "A x B", "A feat. B").
static ARTIST_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    // Lowercase-only " x " so "Lil Nas X" stays one name.
    Regex::new(r"\s*(?:[,&;/]|\s+x\s+|\s+(?i:feat\.?|ft\.?|featuring|with)\s+)\s*").unwrap()
});

/// Normalize a string for keyword comparison
///
/// Applies: accent folding, lowercase, apostrophe removal (don't -> dont),
/// punctuation to word breaks, whitespace collapse.
pub fn normalize(text: &str) -> String {
    unaccent(text)
        .to_lowercase()
        .chars()
        .filter(|&c| c != '\'' && c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split an artist display string into individually normalized artist names.
pub fn artist_names(artist: &str) -> Vec<String> {
    ARTIST_SEPARATOR
        .split(artist)
        .map(normalize)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Whole-word containment on already normalized strings.
///
/// `contains_phrase("alive and well", "live")` is false, while
/// `contains_phrase("levitating live at glastonbury", "live")` is true.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if haystack.is_empty() || phrase.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {phrase} "))
}

/// Number of whole-word occurrences of `phrase` in `haystack`, both already
/// normalized. Occurrences may share words ("live live live" has two "live live").
pub fn count_phrase(haystack: &str, phrase: &str) -> usize {
    let phrase: Vec<&str> = phrase.split_whitespace().collect();
    if phrase.is_empty() {
        return 0;
    }
    let words: Vec<&str> = haystack.split_whitespace().collect();
    words
        .windows(phrase.len())
        .filter(|window| *window == phrase.as_slice())
        .count()
}

/// Containment that ignores spaces, so "dualipavevo" contains "dua lipa".
pub fn contains_compact(haystack: &str, needle: &str) -> bool {
    let needle: String = needle.split_whitespace().collect();
    if needle.is_empty() {
        return false;
    }
    let haystack: String = haystack.split_whitespace().collect();
    haystack.contains(&needle)
}
