//! URL helpers used during negotiation.

use std::collections::HashMap;

use ::url::Url;

use crate::codec::percent_encode;
use crate::error::{CodecError, Result};

/// Query parameters of a location.
///
/// Values are returned exactly as they appear, still percent-encoded. A
/// parameter without `=` maps to an empty string; a repeated name keeps its
/// last value.
pub fn parse_query(location: &str) -> HashMap<String, String> {
    let without_fragment = location.split_once('#').map_or(location, |(base, _)| base);
    let Some((_, query)) = without_fragment.split_once('?') else {
        return HashMap::new();
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Resolve `url` against `base`. Absolute URLs are returned normalized.
pub fn resolve_to_absolute(base: &str, url: &str) -> Result<String> {
    let base = parse(base)?;
    base.join(url)
        .map(|resolved| resolved.to_string())
        .map_err(|source| CodecError::InvalidUrl {
            url: url.to_string(),
            source,
        })
}

/// Append query parameters to `url`, percent-encoding every value.
///
/// Parameters are inserted before any fragment.
pub fn append_query_parameters(url: &str, params: &[(&str, &str)]) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let mut out = base.to_string();
    for (name, value) in params {
        if !(out.ends_with('?') || out.ends_with('&')) {
            out.push(if out.contains('?') { '&' } else { '?' });
        }
        out.push_str(name);
        out.push('=');
        out.push_str(&percent_encode(value));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Scheme, host and port of a URL, serialized as an origin string.
pub fn get_origin(url: &str) -> Result<String> {
    Ok(parse(url)?.origin().ascii_serialization())
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| CodecError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_keeps_values_encoded() {
        let query = parse_query("https://g.example/cb.html?xdm_c=c1&xdm_e=https%3A%2F%2Fh&xdm_po#1_x");
        assert_eq!(query.get("xdm_c").map(String::as_str), Some("c1"));
        assert_eq!(
            query.get("xdm_e").map(String::as_str),
            Some("https%3A%2F%2Fh")
        );
        assert_eq!(query.get("xdm_po").map(String::as_str), Some(""));
        assert_eq!(query.len(), 3);
    }

    #[test]
    fn parse_query_without_query_is_empty() {
        assert!(parse_query("https://g.example/cb.html#a?b=c").is_empty());
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn append_encodes_values_and_keeps_fragment() {
        let url = append_query_parameters(
            "https://g.example/cb.html#top",
            &[("xdm_c", "c 1"), ("xdm_e", "https://h.example/?a=b")],
        );
        assert_eq!(
            url,
            "https://g.example/cb.html?xdm_c=c%201&xdm_e=https%3A%2F%2Fh.example%2F%3Fa%3Db#top"
        );
    }

    #[test]
    fn append_extends_existing_query() {
        assert_eq!(
            append_query_parameters("https://g.example/?v=2", &[("xdm_p", "0")]),
            "https://g.example/?v=2&xdm_p=0"
        );
        assert_eq!(
            append_query_parameters("https://g.example/?", &[("xdm_p", "0")]),
            "https://g.example/?xdm_p=0"
        );
    }

    #[test]
    fn origin_includes_non_default_port() {
        assert_eq!(
            get_origin("https://guest.example/cb.html?x=1#f").unwrap(),
            "https://guest.example"
        );
        assert_eq!(
            get_origin("http://localhost:8080/a").unwrap(),
            "http://localhost:8080"
        );
        assert!(matches!(
            get_origin("not a url"),
            Err(CodecError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn resolves_relative_against_base() {
        assert_eq!(
            resolve_to_absolute("https://host.example/app/index.html", "hash.html").unwrap(),
            "https://host.example/app/hash.html"
        );
        assert_eq!(
            resolve_to_absolute("https://host.example/", "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }
}
