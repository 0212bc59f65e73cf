//! Charset codec carried explicitly through every site request/response.
//!
//! The forum sites do not all speak UTF-8: the movie tracker serves and
//! expects GBK, and a keyword percent-encoded in the wrong charset silently
//! turns into garbage on the other side. Every encode/decode step therefore
//! takes the site's [`Codec`] as an explicit value; nothing infers a charset
//! from the payload.

use encoding_rs::{Encoding, GBK, UTF_8};

/// Wire charset of a resource site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    Gbk,
}

impl Codec {
    /// Parse a configuration label ("utf-8", "gbk", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Codec::Utf8),
            "gbk" | "gb2312" | "gb18030" => Some(Codec::Gbk),
            _ => None,
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            Codec::Utf8 => UTF_8,
            Codec::Gbk => GBK,
        }
    }

    /// Charset token for `Content-Type` headers, the site's preferred casing.
    pub fn charset_token(self) -> &'static str {
        match self {
            Codec::Utf8 => "UTF-8",
            Codec::Gbk => "GBK",
        }
    }

    /// Percent-encode one form value from this charset's bytes.
    pub fn percent_encode(self, value: &str) -> String {
        let (bytes, _, _) = self.encoding().encode(value);
        urlencoding::encode_binary(&bytes).into_owned()
    }

    /// Build an `application/x-www-form-urlencoded` body in this charset.
    pub fn encode_form(self, pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", self.percent_encode(k), self.percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Decode a response body served in this charset.
    pub fn decode_body(self, bytes: &[u8]) -> String {
        let (text, _, _) = self.encoding().decode(bytes);
        text.into_owned()
    }

    /// Round-trip one percent-encoded query value byte-for-byte.
    ///
    /// Redirect targets embed the search keyword already percent-encoded in
    /// the site charset. Re-parsing those escapes as UTF-8 (what a generic
    /// URL API does) corrupts them, so the repair decodes the escapes to raw
    /// bytes and re-encodes the same bytes. `+` is taken as an encoded space,
    /// matching form-style query encoding.
    pub fn reencode_query_value(self, raw: &str) -> String {
        let plus_as_space = raw.replace('+', "%20");
        let bytes = urlencoding::decode_binary(plus_as_space.as_bytes());
        urlencoding::encode_binary(&bytes).into_owned()
    }
}
