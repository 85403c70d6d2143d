use md5::{Digest, Md5};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Stems longer than this are replaced by a short prefix plus a digest.
const MAX_STEM_LEN: usize = 500;
const DIGEST_PREFIX_LEN: usize = 21;
const DIGEST_HEX_LEN: usize = 9;
const FALLBACK: &str = "unknown";
const SEPARATORS: [char; 3] = ['-', '_', '.'];

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9.\-]").expect("valid regex"))
}

fn separator_runs() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"-{2,}").expect("valid regex"),
            Regex::new(r"_{2,}").expect("valid regex"),
            Regex::new(r"\.{2,}").expect("valid regex"),
        ]
    })
}

/// Derives a short, filesystem-safe local filename from an absolute URL.
///
/// The stem is the last path segment (minus its extension) followed by the raw
/// query string. The extension is the URL's own one, falling back to the rule's
/// `default_extension` and finally to `unknown`. The result depends only on the
/// input, so the same URL always maps to the same file.
pub fn derive_filename(url: &str, default_extension: Option<&str>) -> String {
    let (path, query) = split_url(url);
    let (base, extension) = split_extension(last_segment(&path));

    let mut stem = clean_name(&format!("{}{}", base, query.unwrap_or_default()));
    if stem.len() > MAX_STEM_LEN {
        stem = shorten(&stem);
    }
    if stem.is_empty() {
        stem = FALLBACK.to_string();
    }

    format!("{}.{}", stem, pick_extension(extension, default_extension))
}

/// Strips non-ASCII characters, replaces everything outside `[A-Za-z0-9.-]`
/// with `-`, collapses separator runs and drops leading separators.
pub fn clean_name(raw: &str) -> String {
    let ascii: String = raw.chars().filter(char::is_ascii).collect();
    let replaced = unsafe_chars().replace_all(&ascii, "-");
    collapse_separators(&replaced)
        .trim_start_matches(SEPARATORS)
        .to_string()
}

fn collapse_separators(name: &str) -> String {
    let [dashes, underscores, dots] = separator_runs();
    let name = dashes.replace_all(name, "-");
    let name = underscores.replace_all(&name, "_");
    dots.replace_all(&name, ".").into_owned()
}

fn shorten(stem: &str) -> String {
    let digest = hex::encode(Md5::digest(stem.as_bytes()));
    // stem is ASCII after cleaning, byte slicing is safe
    let short = format!(
        "{}-{}",
        &stem[..DIGEST_PREFIX_LEN],
        &digest[..DIGEST_HEX_LEN]
    );
    collapse_separators(&short)
}

fn pick_extension(own: &str, default_extension: Option<&str>) -> String {
    let chosen = if !own.is_empty() {
        own
    } else {
        default_extension.unwrap_or(FALLBACK)
    };
    let cleaned = clean_name(chosen.trim_start_matches('.'));
    if cleaned.is_empty() {
        FALLBACK.to_string()
    } else {
        cleaned
    }
}

/// Returns the raw (still percent-encoded) path and query of `url`.
///
/// Strings the URL parser rejects are split by hand so that even a malformed
/// reference still yields a usable name.
fn split_url(url: &str) -> (String, Option<String>) {
    if let Ok(parsed) = Url::parse(url) {
        return (parsed.path().to_string(), parsed.query().map(str::to_string));
    }

    let without_fragment = url.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (without_fragment, None),
    };
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or_default(),
        None => path,
    };
    (path.to_string(), query)
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Splits `name.ext` into (`name`, `ext`). Dotfiles have no extension.
fn split_extension(segment: &str) -> (&str, &str) {
    match segment.rfind('.') {
        Some(0) | None => (segment, ""),
        Some(i) => (&segment[..i], &segment[i + 1..]),
    }
}
