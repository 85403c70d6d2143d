use url::Url;

/// Schemes whose references are taken as already absolute.
const ABSOLUTE_PREFIXES: [&str; 3] = ["http:", "https:", "ftp:"];

/// Turns references found in markup into absolute URLs, using the page's own
/// location as base.
///
/// Resolution is purely textual. Nothing is validated here; a malformed result
/// only shows up later when fetching it fails.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base_url: Url,
}

impl UrlResolver {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve(&self, raw: &str) -> String {
        if has_absolute_scheme(raw) {
            return raw.to_string();
        }

        // Protocol-relative URL, reuse the page's scheme
        if raw.starts_with("//") {
            return format!("{}:{}", self.base_url.scheme(), raw);
        }

        let mut url = self.origin();
        if raw.starts_with('/') {
            url.push_str(raw);
            return url;
        }

        url.push_str(directory_of(self.base_url.path()));
        if !url.ends_with('/') && !raw.starts_with('/') {
            url.push('/');
        }
        url.push_str(raw);
        url
    }

    fn origin(&self) -> String {
        let mut origin = format!(
            "{}://{}",
            self.base_url.scheme(),
            self.base_url.host_str().unwrap_or_default()
        );
        if let Some(port) = self.base_url.port() {
            origin.push_str(&format!(":{}", port));
        }
        origin
    }
}

fn has_absolute_scheme(raw: &str) -> bool {
    ABSOLUTE_PREFIXES.iter().any(|prefix| {
        raw.get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Everything before the last `/` of a URL path.
fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}
