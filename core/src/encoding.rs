//! URL helpers: percent-encoding, query strings and path joining.

use serde_json::{Map, Value};

/// Percent-encode `input`, leaving only ASCII alphanumerics and `-._~[]`
/// unescaped. Reserved delimiters such as `?`, `&` and `=` are always escaped.
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input)
        .replace("%5B", "[")
        .replace("%5D", "]")
}

/// Encode a parameter map as `key=value` pairs joined by `&`.
/// Null values are skipped; strings are encoded without JSON quoting.
pub fn url_encoded_query(parameters: &Map<String, Value>) -> String {
    parameters
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => url_encode(text),
                other => url_encode(&other.to_string()),
            };
            format!("{}={value}", url_encode(key))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append `query` to `url`.
///
/// A leading `?` on the query and a trailing `?` on the URL are dropped, and
/// the two are joined with `&` when the URL already has a query, otherwise
/// with `?`. An empty query leaves the URL untouched.
pub fn append_query_string(url: &str, query: &str) -> String {
    let query = query.strip_prefix('?').unwrap_or(query);
    if query.is_empty() {
        return url.to_string();
    }
    let url = url.strip_suffix('?').unwrap_or(url);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
