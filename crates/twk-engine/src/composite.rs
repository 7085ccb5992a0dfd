//! Merge and removal of single `key=value` tokens in a delimited text value.
//!
//! Empty tokens (from leading, trailing, or doubled delimiters) are dropped
//! on every rewrite, so the result never carries a dangling separator.

use twk_types::COMPOSITE_DELIMITER;

/// Key of a `key=value` token; the whole token when it has no `=`.
pub fn token_key(token: &str) -> &str {
    token.split_once('=').map_or(token, |(key, _)| key)
}

fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(COMPOSITE_DELIMITER).filter(|t| !t.is_empty())
}

fn join(tokens: Vec<&str>) -> String {
    let mut out = String::new();
    for (i, token) in tokens.into_iter().enumerate() {
        if i > 0 {
            out.push(COMPOSITE_DELIMITER);
        }
        out.push_str(token);
    }
    out
}

/// Replace every token keyed like `token` with `token`, or append it if no
/// token has that key. Existing token order is preserved.
pub fn merge_token(existing: &str, token: &str) -> String {
    let key = token_key(token);
    let mut found = false;
    let mut merged: Vec<&str> = tokens(existing)
        .map(|t| {
            if token_key(t) == key {
                found = true;
                token
            } else {
                t
            }
        })
        .collect();
    if !found {
        merged.push(token);
    }
    join(merged)
}

/// Drop every token whose key is `key`.
pub fn remove_token(existing: &str, key: &str) -> String {
    join(tokens(existing).filter(|t| token_key(t) != key).collect())
}
