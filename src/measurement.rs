//! # Measurement Ingestion
//!
//! [`Writer::add`](crate::writer::Writer::add) accepts a single pair, a list
//! of pairs, a mapping, or a URL-encoded query string. All four collapse
//! here into one normalized path: a flat list of `(key bytes, f32 value)`
//! pairs, so the per-pair NaN/overflow/whitelist checks in `Writer::add` only
//! need to handle one shape.

/// The input shapes `Writer::add` accepts, normalized to one ingestion path.
pub enum Measurements {
    Pairs(Vec<(Vec<u8>, f32)>),
    Query(String),
}

impl Measurements {
    /// A single `(key, value)` measurement.
    pub fn single(key: impl Into<Vec<u8>>, value: f32) -> Self {
        Self::Pairs(vec![(key.into(), value)])
    }

    /// A batch of measurements — also the normalized form for a mapping
    /// input (`some_map.into_iter()` already yields `(key, value)` pairs).
    pub fn pairs<K: Into<Vec<u8>>>(pairs: impl IntoIterator<Item = (K, f32)>) -> Self {
        Self::Pairs(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A `key=value&key2=value2` query string.
    pub fn query(query: impl Into<String>) -> Self {
        Self::Query(query.into())
    }

    /// Normalizes to `(key, value)` pairs. A query string's values are
    /// parsed as f32; unparseable text becomes NaN so the caller's
    /// configured NaN policy decides its fate the same way as any other
    /// shape, rather than failing parsing separately.
    pub(crate) fn into_pairs(self) -> Vec<(Vec<u8>, f32)> {
        match self {
            Self::Pairs(pairs) => pairs,
            Self::Query(query) => parse_query_string(&query)
                .into_iter()
                .map(|(key, value)| (key, value.parse::<f32>().unwrap_or(f32::NAN)))
                .collect(),
        }
    }
}

/// Parses a `key=value&key2=value2` query string with percent-decoding.
pub fn parse_query_string(query: &str) -> Vec<(Vec<u8>, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = percent_decode(parts.next().unwrap_or(""));
            let value = percent_decode(parts.next().unwrap_or(""));
            (key, String::from_utf8_lossy(&value).into_owned())
        })
        .collect()
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_query_string() {
        let pairs = parse_query_string("cpu=50&mem=12.5");
        assert_eq!(
            pairs,
            vec![
                (b"cpu".to_vec(), "50".to_string()),
                (b"mem".to_vec(), "12.5".to_string()),
            ]
        );
    }

    #[test]
    fn decodes_percent_and_plus() {
        let pairs = parse_query_string("a+b=c%2Dd");
        assert_eq!(pairs, vec![(b"a b".to_vec(), "c-d".to_string())]);
    }

    #[test]
    fn query_values_that_fail_to_parse_become_nan() {
        let measurements = Measurements::query("cpu=notanumber");
        let pairs = measurements.into_pairs();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].1.is_nan());
    }

    #[test]
    fn single_and_pairs_normalize_the_same_way() {
        let a = Measurements::single("cpu", 1.0).into_pairs();
        let b = Measurements::pairs([("cpu", 1.0)]).into_pairs();
        assert_eq!(a, b);
    }
}
