//! Keyword tokenization and full-text query construction.

use std::collections::HashSet;

/// Portuguese and English function words that carry no search signal.
pub const STOP_WORDS: &[&str] = &[
    "de", "da", "do", "das", "dos", "para", "com", "em", "na", "no", "nas", "nos", "por", "sobre",
    "entre", "até", "desde", "durante", "após", "antes", "depois", "the", "a", "an", "and", "or",
    "but", "in", "on", "at", "to", "for", "of", "with", "by", "from", "up", "about", "into",
    "through", "during", "before", "after", "e", "ou", "mas", "se", "que", "como", "quando", "onde",
    "porque", "então", "é", "são", "foi", "será", "tem", "têm", "ter", "terá", "pode", "podem",
    "poder", "poderá", "deve", "devem", "dever", "deverá", "vai", "vão", "ir", "vir", "virá",
    "fazer", "fez", "fará", "dizer", "disse", "dirá",
];

/// Tokens must be longer than this many characters to be kept.
pub const MIN_TOKEN_CHARS: usize = 2;

/// Fewer surviving tokens than this and the raw keyword phrases are used
/// instead.
pub const MIN_MEANINGFUL_TOKENS: usize = 3;

/// Splits keywords on whitespace and keeps meaningful tokens.
///
/// Tokens are case-folded; stop words and tokens of
/// [`MIN_TOKEN_CHARS`] characters or fewer are dropped, and duplicates are
/// removed keeping the first occurrence.
#[must_use]
pub fn filter_tokens<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .flat_map(|k| k.as_ref().split_whitespace())
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Quotes a term as an FTS5 string, doubling embedded quotes.
#[must_use]
pub fn quote_term(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Joins terms into a disjunctive FTS5 `MATCH` expression.
///
/// Blank terms are skipped; returns `None` when nothing is left.
#[must_use]
pub fn disjunction<S: AsRef<str>>(terms: &[S]) -> Option<String> {
    let quoted: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(quote_term)
        .collect();
    (!quoted.is_empty()).then(|| quoted.join(" OR "))
}

/// Builds the primary search query for a keyword list.
///
/// Uses the filtered tokens when at least [`MIN_MEANINGFUL_TOKENS`]
/// survive, otherwise falls back to the raw keyword phrases.
#[must_use]
pub fn build_match_query<S: AsRef<str>>(keywords: &[S], tokens: &[String]) -> Option<String> {
    if tokens.len() >= MIN_MEANINGFUL_TOKENS {
        disjunction(tokens)
    } else {
        disjunction(keywords)
    }
}
