//! Keyword-aware query rewriting for Open Library.

/// Token rewrites applied after lowercasing.
const SYNONYMS: [(&str, &str); 3] = [
    ("intro", "introduction"),
    ("updated", "latest"),
    ("python", "python"),
];

/// Build a search query from a free-text query plus extra keywords.
///
/// Tokens are the trimmed query (when non-blank) followed by the trimmed,
/// non-blank keywords. Each token is lowercased and rewritten through the
/// synonym table; repeats are dropped keeping the first occurrence.
pub fn build_query<S: AsRef<str>>(query: &str, keywords: &[S]) -> String {
    let query = query.trim();
    let tokens = std::iter::once(query)
        .filter(|q| !q.is_empty())
        .chain(keywords.iter().map(|k| k.as_ref().trim()).filter(|k| !k.is_empty()));

    let mut normalized: Vec<String> = Vec::new();
    for token in tokens {
        let lower = token.to_lowercase();
        let rewritten = SYNONYMS
            .iter()
            .find(|(from, _)| *from == lower)
            .map(|(_, to)| to.to_string())
            .unwrap_or(lower);
        if !normalized.contains(&rewritten) {
            normalized.push(rewritten);
        }
    }
    normalized.join(" ")
}
