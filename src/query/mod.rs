//! Query sanitization
//!
//! Solr's standard query parser treats a number of characters as syntax:
//! - Boolean operators: `+`, `-`, `&`, `|`, `!`
//! - Grouping: `(`, `)`, `{`, `}`, `[`, `]`
//! - Boosts, fuzziness and wildcards: `^`, `~`, `*`, `?`
//! - Phrases, fields and escapes: `"`, `'`, `:`, `\`, `/`, `,`
//!
//! [`sanitize`] turns free text into a fragment where none of these survive,
//! without needing a parser for the query language itself.

use once_cell::sync::Lazy;
use regex::Regex;

static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[-+&|!(){}\[\]^"~*?:\\/',]"#).expect("valid special chars regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Replace every Solr special character with a single space, collapse
/// whitespace runs and trim the result.
///
/// ```
/// assert_eq!(solr_gateway::query::sanitize("a-b+c"), "a b c");
/// ```
pub fn sanitize(text: &str) -> String {
    let stripped = SPECIAL_CHARS.replace_all(text, " ");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Check whether `text` is already in sanitized form
pub fn is_sanitized(text: &str) -> bool {
    sanitize(text) == text
}
