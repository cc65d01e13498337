use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

/// URI-component escaping: everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Separator between the sequence number and the payload.
pub const SEPARATOR: char = '_';

/// A fragment split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment<'a> {
    /// Sequence number, when the fragment carries a well-formed one.
    pub sequence: Option<u64>,
    /// Payload, still percent-encoded.
    pub payload: &'a str,
}

/// Percent-encode a string as a URI component.
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Percent-decode a URI component.
///
/// Invalid escapes are kept verbatim and invalid UTF-8 is replaced, so a
/// fragment rewritten by an unrelated navigation never fails to decode.
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Build the URL that delivers `message` as message number `sequence`.
///
/// Wire format:
/// ```text
/// <url>#<sequence>_<percent-encoded message>
/// ```
pub fn encode_message(url: &str, sequence: u64, message: &str) -> String {
    format!("{url}#{sequence}{SEPARATOR}{}", percent_encode(message))
}

/// Payload of a received fragment: everything after the first `_`.
///
/// The payload is not percent-decoded. A fragment without a separator is
/// returned whole.
pub fn decode_fragment(fragment: &str) -> &str {
    match fragment.find(SEPARATOR) {
        Some(index) => &fragment[index + SEPARATOR.len_utf8()..],
        None => fragment,
    }
}

/// Split a received fragment into sequence number and payload.
pub fn parse_fragment(fragment: &str) -> Fragment<'_> {
    let payload = decode_fragment(fragment);
    let sequence = fragment
        .strip_prefix('#')
        .unwrap_or(fragment)
        .split_once(SEPARATOR)
        .and_then(|(sequence, _)| sequence.parse().ok());
    Fragment { sequence, payload }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://guest.example/cb.html?xdm_c=c1&xdm_p=0";

    fn fragment_of(url: &str) -> &str {
        &url[url.find('#').unwrap()..]
    }

    #[test]
    fn roundtrip_through_percent_decoding() {
        for message in ["hello", "a#b", "x&y=z", "two words", "1_2_3", "", "häst ✓"] {
            for sequence in [0u64, 1, 42, u64::MAX] {
                let url = encode_message(URL, sequence, message);
                let payload = decode_fragment(fragment_of(&url));
                assert_eq!(percent_decode(payload), message, "seq {sequence}");
            }
        }
    }

    #[test]
    fn escapes_like_uri_components() {
        assert_eq!(percent_encode("a b&c#d"), "a%20b%26c%23d");
        assert_eq!(percent_encode("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn fragment_is_appended_to_url() {
        assert_eq!(encode_message(URL, 7, "hi"), format!("{URL}#7_hi"));
    }

    #[test]
    fn same_payload_differs_by_sequence() {
        let first = encode_message(URL, 3, "ping");
        let second = encode_message(URL, 4, "ping");
        assert_ne!(fragment_of(&first), fragment_of(&second));
    }

    #[test]
    fn fragment_without_separator_is_returned_whole() {
        assert_eq!(decode_fragment("#section"), "#section");
        assert_eq!(decode_fragment(""), "");
    }

    #[test]
    fn only_first_separator_splits() {
        assert_eq!(decode_fragment("#5_a_b"), "a_b");
    }

    #[test]
    fn parse_exposes_sequence() {
        assert_eq!(
            parse_fragment("#12_hi%20there"),
            Fragment {
                sequence: Some(12),
                payload: "hi%20there"
            }
        );
        assert_eq!(
            parse_fragment("#c1"),
            Fragment {
                sequence: None,
                payload: "#c1"
            }
        );
        assert_eq!(parse_fragment("#x_y").sequence, None);
    }

    #[test]
    fn malformed_escapes_do_not_fail() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%FF"), "\u{FFFD}");
    }

    #[test]
    fn fragment_serializes_for_reports() {
        let json = serde_json::to_string(&parse_fragment("#1_x")).unwrap();
        assert_eq!(json, r#"{"sequence":1,"payload":"x"}"#);
    }
}
