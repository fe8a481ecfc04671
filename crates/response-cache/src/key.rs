use std::collections::BTreeMap;

/// Build a cache key from an operation name and its parameters.
///
/// Parameter names are sorted before joining, so callers may assemble the map
/// in any order. A repeated name keeps its last value. The separators `:` and
/// `|` (and `%` itself) are percent-escaped inside names and values, so a value
/// cannot impersonate another parameter.
pub fn build_key<I, K, V>(operation: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (escape(k.as_ref()), escape(v.as_ref())))
        .collect();

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("|");

    format!("{}:{}", escape(operation), joined)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '|' => out.push_str("%7C"),
            _ => out.push(c),
        }
    }
    out
}
