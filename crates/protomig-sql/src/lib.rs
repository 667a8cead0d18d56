//! SQL identifier helpers.
//!
//! Everything that ends up as an identifier in generated DDL goes through this
//! crate, so quoting and constraint naming stay consistent between the
//! reconciler and anything that inspects its output.

/// Maximum identifier length PostgreSQL keeps (longer names are truncated).
pub const PG_IDENT_MAX: usize = 63;

/// Number of hex characters of the blake3 hash used in shortened names.
const HASH_SUFFIX_LEN: usize = 16;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use protomig_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Fit `name` into [`PG_IDENT_MAX`] bytes.
///
/// Names that already fit are returned unchanged. Longer ones keep a
/// truncated prefix followed by a hash of the whole name, so PostgreSQL never
/// truncates them itself and two long names sharing a prefix stay distinct:
///
/// ```
/// use protomig_sql::{PG_IDENT_MAX, bounded_ident};
/// assert_eq!(bounded_ident("widget_tags"), "widget_tags");
/// let long = "market_data_feed_orderbooklevelaggregatesnapshot_historical_price_points";
/// assert_eq!(bounded_ident(long).len(), PG_IDENT_MAX);
/// ```
pub fn bounded_ident(name: &str) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name.to_string();
    }
    let max_prefix_len = PG_IDENT_MAX - 1 - HASH_SUFFIX_LEN;
    format!(
        "{}_{}",
        truncate_at_char_boundary(name, max_prefix_len),
        hash_suffix(&[name])
    )
}

/// Generate a deterministic foreign key constraint name.
///
/// The name is `fk_{table}_{column}_` followed by a hash of the whole
/// relationship, so two different foreign keys on the same table never share
/// a name, and the same relationship gets the same name on every run. The
/// readable part is truncated so the name fits in [`PG_IDENT_MAX`] bytes:
///
/// ```
/// let name = protomig_sql::foreign_key_name("widget_tags", "parent_id", "widget", "id");
/// assert!(name.starts_with("fk_widget_tags_parent_id_"));
/// assert_eq!(name.len(), "fk_widget_tags_parent_id_".len() + 16);
/// ```
pub fn foreign_key_name(
    table: &str,
    column: &str,
    references_table: &str,
    references_column: &str,
) -> String {
    let suffix = hash_suffix(&[table, column, references_table, references_column]);
    let readable = format!("{}_{}", table, column);
    let max_readable_len = PG_IDENT_MAX - "fk__".len() - HASH_SUFFIX_LEN;

    format!(
        "fk_{}_{}",
        truncate_at_char_boundary(&readable, max_readable_len),
        suffix
    )
}

/// First [`HASH_SUFFIX_LEN`] hex characters of the blake3 hash of `parts`.
fn hash_suffix(parts: &[&str]) -> String {
    // NUL can't appear in identifiers, so the joined key is unambiguous.
    let key = parts.join("\0");
    let hex = blake3::hash(key.as_bytes()).to_hex();
    hex.as_str()[..HASH_SUFFIX_LEN].to_string()
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut len = max;
    while len > 0 && !s.is_char_boundary(len) {
        len -= 1;
    }
    &s[..len]
}
