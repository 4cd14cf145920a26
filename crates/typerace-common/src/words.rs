//! Passage generation for new rooms and restarts.

use rand::Rng;

/// Common English words used to build race passages.
pub const COMMON_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "it", "for",
    "not", "on", "with", "he", "as", "you", "do", "at", "this", "but", "his",
    "by", "from", "they", "we", "say", "her", "she", "or", "an", "will", "my",
    "one", "all", "would", "there", "their", "what", "so", "up", "out", "if",
    "about", "who", "get", "which", "go", "me", "when", "make", "can", "like",
    "time", "no", "just", "him", "know", "take", "people", "into", "year",
    "your", "good", "some", "could", "them", "see", "other", "than", "then",
    "now", "look", "only", "come", "its", "over", "think", "also", "back",
    "after", "use", "two", "how", "our", "work", "first", "well", "way",
    "even", "new", "want", "because", "any", "these", "give", "day", "most",
    "us", "is", "was", "are", "been", "has", "had", "were", "said", "each",
    "may", "part", "find", "long", "down", "side", "many", "place",
];

/// Build a passage of `count` words, never picking the same word twice in a
/// row.
pub fn generate_words(count: usize, rng: &mut impl Rng) -> String {
    let mut words: Vec<&str> = Vec::with_capacity(count);
    for i in 0..count {
        loop {
            let word = COMMON_WORDS[rng.gen_range(0..COMMON_WORDS.len())];
            if i == 0 || words[i - 1] != word {
                words.push(word);
                break;
            }
        }
    }
    words.join(" ")
}
