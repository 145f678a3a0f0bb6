//! Lexical check that an answer is supported by the retrieved documents
//!
//! A cheap heuristic, not an entailment model: the answer must share enough
//! content words with the context.


use std::collections::HashSet;

/// Words shorter than this are treated as function words
const MIN_TOKEN_CHARS: usize = 4;

/// Fraction of the answer's content words that must appear in the context
const MIN_OVERLAP_RATIO: f32 = 0.1;

/// Lowercased alphanumeric words of at least four characters
pub fn content_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Whether `answer` shares enough content words with `context`
pub fn is_grounded(answer: &str, context: &[&str]) -> bool {
    let answer_tokens = content_tokens(answer);
    if answer_tokens.is_empty() {
        return false;
    }

    let context_tokens: HashSet<String> = context
        .iter()
        .flat_map(|text| content_tokens(text))
        .collect();

    let shared = answer_tokens
        .iter()
        .filter(|token| context_tokens.contains(*token))
        .count();

    shared > 0 && shared as f32 >= answer_tokens.len() as f32 * MIN_OVERLAP_RATIO
}

/// Whether `answer` contains `phrase`, ignoring case and surrounding punctuation
///
/// Typographic apostrophes count as `'`.
pub fn mentions_phrase(answer: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    !phrase.is_empty() && normalize(answer).contains(&phrase)
}

fn normalize(text: &str) -> String {
    text.replace(['’', '‘'], "'")
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
