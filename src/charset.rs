use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use regex::bytes::Regex;
use std::sync::OnceLock;

/// How far into the body a `<meta>` charset declaration is looked for.
const META_SNIFF_LEN: usize = 1024;

/// Page markup decoded to UTF-8, remembering the encoding it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub text: String,
    pub encoding: &'static Encoding,
}

impl PageText {
    /// Decodes `body`, picking the encoding from a byte order mark, then the
    /// `Content-Type` charset, then a `<meta>` declaration, then UTF-8.
    /// Malformed sequences become U+FFFD.
    pub fn decode(body: &[u8], content_type: Option<&str>) -> Self {
        let encoding = Encoding::for_bom(body)
            .map(|(encoding, _)| encoding)
            .or_else(|| content_type.and_then(header_charset))
            .or_else(|| meta_charset(body))
            .unwrap_or(UTF_8);

        let (text, encoding, _) = encoding.decode(body);
        Self {
            text: text.into_owned(),
            encoding,
        }
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }
}

fn header_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| {
            let label = value.trim().trim_matches(|c| c == '"' || c == '\'');
            Encoding::for_label(label.as_bytes())
        })
}

fn meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    static META: OnceLock<Regex> = OnceLock::new();
    let meta = META.get_or_init(|| {
        Regex::new(r#"(?i-u)<meta\s[^>]*charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#)
            .expect("valid regex")
    });

    let prefix = &body[..body.len().min(META_SNIFF_LEN)];
    let label = meta.captures(prefix)?.get(1)?;
    let encoding = Encoding::for_label(label.as_bytes())?;
    // A byte-oriented declaration cannot name a UTF-16 encoding
    if encoding == UTF_16LE || encoding == UTF_16BE {
        Some(UTF_8)
    } else {
        Some(encoding)
    }
}
