use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::document::{Document, Element};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::file_manager::{FileManager, LocalAsset};
use crate::manifest::ManifestEntry;
use crate::naming::derive_filename;
use crate::observer::{MirrorEvent, MirrorObserver};
use crate::resolver::UrlResolver;
use crate::rules::{RuleSet, SelectorRule};

/// Attributes a mirrored copy can never satisfy.
const STRIPPED_ATTRIBUTES: [&str; 2] = ["crossorigin", "integrity"];

/// Result of one pipeline pass.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// One entry per resolved reference, in rule-then-document order.
    pub entries: Vec<ManifestEntry>,
    pub rewritten: usize,
    pub reused: usize,
    pub failed: usize,
}

/// A reference waiting for its destination to be materialized.
struct PendingRewrite {
    element: Element,
    attribute: String,
    raw: String,
    job: usize,
}

/// One destination to materialize, owned by the first rule that reached it.
struct AssetJob<'r> {
    asset: LocalAsset,
    rule: &'r SelectorRule,
}

enum Materialized {
    Reused,
    Stored,
    Failed,
}

/// Finds resource references in a document, mirrors them and points the
/// document at the local copies.
pub struct AssetPipeline<'a, F> {
    fetcher: &'a F,
    rules: &'a RuleSet,
    resolver: &'a UrlResolver,
    files: &'a FileManager,
    observer: &'a dyn MirrorObserver,
    max_concurrent: usize,
}

impl<'a, F: Fetcher> AssetPipeline<'a, F> {
    pub fn new(
        fetcher: &'a F,
        rules: &'a RuleSet,
        resolver: &'a UrlResolver,
        files: &'a FileManager,
        observer: &'a dyn MirrorObserver,
    ) -> Self {
        Self {
            fetcher,
            rules,
            resolver,
            files,
            observer,
            max_concurrent: 1,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub async fn process(&self, document: &mut Document) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();
        let mut pending = Vec::new();
        let mut jobs: Vec<AssetJob<'a>> = Vec::new();

        self.collect(document, &mut outcome, &mut pending, &mut jobs);

        // Destinations are unique per job, so no two fetches write the same file
        let results: HashMap<usize, Materialized> = stream::iter(jobs.iter().enumerate())
            .map(|(index, job)| async move { (index, self.materialize(job).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        // Counted per reference, not per destination
        for rewrite in pending {
            let local_path = &jobs[rewrite.job].asset.local_path;
            match results.get(&rewrite.job) {
                Some(Materialized::Failed) | None => {
                    outcome.failed += 1;
                    continue;
                }
                Some(Materialized::Reused) => outcome.reused += 1,
                Some(Materialized::Stored) => {}
            }

            rewrite.element.set_attr(&rewrite.attribute, local_path);
            outcome.rewritten += 1;
            self.observer.notify(&MirrorEvent::Rewritten {
                from: rewrite.raw,
                to: local_path.clone(),
            });
        }

        outcome
    }

    /// Walks the rules in order, resolving every reference and recording it.
    fn collect(
        &self,
        document: &Document,
        outcome: &mut PipelineOutcome,
        pending: &mut Vec<PendingRewrite>,
        jobs: &mut Vec<AssetJob<'a>>,
    ) {
        let mut claimed: HashSet<(usize, String)> = HashSet::new();
        let mut job_by_destination: HashMap<PathBuf, usize> = HashMap::new();

        for rule in self.rules.iter() {
            self.observer.notify(&MirrorEvent::RuleStarted {
                selector: rule.matcher.to_string(),
            });

            for element in document.select(&rule.matcher) {
                for attribute in STRIPPED_ATTRIBUTES {
                    element.remove_attr(attribute);
                }

                let raw = match element.attr(&rule.attribute) {
                    Some(raw) if !raw.is_empty() => raw,
                    _ => continue,
                };
                // An attribute belongs to the first rule that reaches it
                if !claimed.insert((element.id(), rule.attribute.clone())) {
                    continue;
                }

                let url = self.resolver.resolve(&raw);
                self.observer.notify(&MirrorEvent::ReferenceResolved {
                    raw: raw.clone(),
                    url: url.clone(),
                });

                let filename = derive_filename(&url, rule.default_extension.as_deref());
                let asset = self.files.asset(&url, &filename);
                outcome.entries.push(ManifestEntry {
                    url: url.clone(),
                    local: asset.destination.clone(),
                });

                let job = *job_by_destination
                    .entry(asset.destination.clone())
                    .or_insert_with(|| {
                        jobs.push(AssetJob { asset, rule });
                        jobs.len() - 1
                    });

                pending.push(PendingRewrite {
                    element,
                    attribute: rule.attribute.clone(),
                    raw,
                    job,
                });
            }
        }
    }

    async fn materialize(&self, job: &AssetJob<'_>) -> Materialized {
        let asset = &job.asset;
        if self.files.is_materialized(asset).await {
            self.observer.notify(&MirrorEvent::AlreadyMaterialized {
                url: asset.url.clone(),
                local: asset.destination.clone(),
            });
            return Materialized::Reused;
        }

        match self.download(job).await {
            Ok(bytes) => {
                self.observer.notify(&MirrorEvent::Stored {
                    url: asset.url.clone(),
                    local: asset.destination.clone(),
                    bytes,
                });
                Materialized::Stored
            }
            Err(e) => {
                self.observer.notify(&MirrorEvent::ResourceFailed {
                    url: asset.url.clone(),
                    reason: e.to_string(),
                });
                Materialized::Failed
            }
        }
    }

    async fn download(&self, job: &AssetJob<'_>) -> Result<u64, FetchError> {
        let asset = &job.asset;
        self.observer.notify(&MirrorEvent::Downloading {
            url: asset.url.clone(),
        });

        let response = self.fetcher.fetch(&asset.url).await?;
        let bytes = response.write_to(&asset.destination).await?;

        if let Some(post) = &job.rule.post_processor {
            post.process(&asset.destination)
                .map_err(|source| FetchError::Write {
                    path: asset.destination.clone(),
                    source,
                })?;
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchResponse;
    use crate::observer::{MockMirrorObserver, NullObserver};
    use crate::rules::PostProcessor;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use url::Url;

    /// Serves `index.js`-style paths from a fixed table; everything else is 404.
    #[derive(Default)]
    struct TableFetcher {
        pages: HashMap<String, &'static str>,
        requests: Mutex<Vec<String>>,
    }

    impl TableFetcher {
        fn with(mut self, url: &str, body: &'static str) -> Self {
            self.pages.insert(url.to_string(), body);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetcher for TableFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            Ok(match self.pages.get(url) {
                Some(body) => FetchResponse::from_bytes(url, StatusCode::OK, *body),
                None => FetchResponse::from_bytes(url, StatusCode::NOT_FOUND, "not found"),
            })
        }
    }

    struct Fixture {
        _temp_dir: tempfile::TempDir,
        files: FileManager,
        resolver: UrlResolver,
    }

    fn fixture() -> Fixture {
        let temp_dir = tempdir().unwrap();
        let files = FileManager::new(&temp_dir.path().join("site"), "res");
        let resolver = UrlResolver::new(Url::parse("https://example.com/blog/post.html").unwrap());
        Fixture {
            _temp_dir: temp_dir,
            files,
            resolver,
        }
    }

    #[tokio::test]
    async fn rewrites_fetched_references() {
        let fx = fixture();
        let fetcher = TableFetcher::default()
            .with("https://example.com/blog/app.js", "var a;")
            .with("https://example.com/logo.png", "PNG");
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(
            r#"<html><head><script src="app.js" integrity="sha-x" crossorigin></script></head>
            <body><img src="/logo.png"></body></html>"#,
        );
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.rewritten, 2);
        assert_eq!(outcome.failed, 0);

        let html = document.to_html().unwrap();
        assert!(html.contains(r#"<script src="res/app.js">"#), "{}", html);
        assert!(html.contains(r#"<img src="res/logo.png">"#), "{}", html);
        assert_eq!(
            std::fs::read_to_string(fx.files.resource_dir().join("app.js")).unwrap(),
            "var a;"
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_reference_and_warns() {
        let fx = fixture();
        let fetcher = TableFetcher::default();
        let rules = RuleSet::builtin();

        let mut observer = MockMirrorObserver::new();
        observer
            .expect_notify()
            .withf(|event| matches!(event, MirrorEvent::ResourceFailed { url, .. } if url == "https://cdn.com/gone.js"))
            .times(1)
            .return_const(());
        observer
            .expect_notify()
            .withf(|event| !matches!(event, MirrorEvent::ResourceFailed { .. }))
            .return_const(());

        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &observer);
        let mut document = Document::parse(r#"<script src="https://cdn.com/gone.js"></script>"#);
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.rewritten, 0);
        assert!(document
            .to_html()
            .unwrap()
            .contains(r#"src="https://cdn.com/gone.js""#));
    }

    #[tokio::test]
    async fn same_destination_is_fetched_once() {
        let fx = fixture();
        let fetcher = TableFetcher::default().with("https://example.com/a.png", "PNG");
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver)
            .with_max_concurrent(8);

        let mut document = Document::parse(
            r#"<img src="/a.png"><img src="https://example.com/a.png"><img src="//example.com/a.png">"#,
        );
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(fetcher.requests(), vec!["https://example.com/a.png"]);
        assert_eq!(outcome.entries.len(), 3);
        assert_eq!(outcome.rewritten, 3);
    }

    #[tokio::test]
    async fn shared_failing_destination_counts_every_reference() {
        let fx = fixture();
        let fetcher = TableFetcher::default();
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<img src="/gone.png"><img src="https://example.com/gone.png">"#);
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(fetcher.requests(), vec!["https://example.com/gone.png"]);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.rewritten, 0);
    }

    #[tokio::test]
    async fn shared_existing_destination_counts_every_reuse() {
        let fx = fixture();
        fx.files.create_directories().unwrap();
        std::fs::write(fx.files.resource_dir().join("a.png"), b"old").unwrap();

        let fetcher = TableFetcher::default();
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<img src="/a.png"><img src="//example.com/a.png">"#);
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(outcome.reused, 2);
        assert_eq!(outcome.rewritten, 2);
    }

    #[tokio::test]
    async fn existing_files_are_not_fetched_again() {
        let fx = fixture();
        fx.files.create_directories().unwrap();
        std::fs::write(fx.files.resource_dir().join("a.png"), b"old").unwrap();

        let fetcher = TableFetcher::default();
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<img src="/a.png">"#);
        let outcome = pipeline.process(&mut document).await;

        assert!(fetcher.requests().is_empty());
        assert_eq!(outcome.reused, 1);
        assert!(document.to_html().unwrap().contains(r#"src="res/a.png""#));
    }

    #[tokio::test]
    async fn skips_missing_and_empty_attributes_but_strips_integrity() {
        let fx = fixture();
        let fetcher = TableFetcher::default();
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<img alt="x" crossorigin="anonymous"><img src="" integrity="sha-1">"#);
        let outcome = pipeline.process(&mut document).await;

        assert!(outcome.entries.is_empty());
        assert!(fetcher.requests().is_empty());
        let html = document.to_html().unwrap();
        assert!(!html.contains("crossorigin"));
        assert!(!html.contains("integrity"));
    }

    #[tokio::test]
    async fn overlapping_rules_claim_an_attribute_once() {
        let fx = fixture();
        let fetcher = TableFetcher::default().with("https://example.com/favicon.ico", "ICO");
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<link rel="shortcut icon" href="/favicon.ico">"#);
        let outcome = pipeline.process(&mut document).await;

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(fetcher.requests(), vec!["https://example.com/favicon.ico"]);
        assert!(document.to_html().unwrap().contains(r#"href="res/favicon.ico""#));
    }

    #[tokio::test]
    async fn rule_extensions_apply_to_extensionless_urls() {
        let fx = fixture();
        let fetcher = TableFetcher::default()
            .with("https://example.com/css?family=Roboto", "body{}")
            .with("https://example.com/pixel", "GIF");
        let rules = RuleSet::builtin();
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(
            r#"<link rel="stylesheet" href="/css?family=Roboto"><img src="/pixel">"#,
        );
        pipeline.process(&mut document).await;

        let html = document.to_html().unwrap();
        assert!(html.contains(r#"href="res/cssfamily-Roboto.css""#), "{}", html);
        assert!(html.contains(r#"src="res/pixel.unknown""#), "{}", html);
    }

    #[tokio::test]
    async fn runs_post_processors_after_storing() {
        struct Counting(AtomicUsize);
        impl PostProcessor for Counting {
            fn process(&self, local_path: &std::path::Path) -> std::io::Result<()> {
                assert!(local_path.is_file());
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let fx = fixture();
        let fetcher = TableFetcher::default().with("https://example.com/a.css", "body{}");
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut rules = RuleSet::empty();
        rules.push(
            SelectorRule::new("link[href]", "href", Some("css"))
                .unwrap()
                .with_post_processor(counter.clone()),
        );
        let pipeline = AssetPipeline::new(&fetcher, &rules, &fx.resolver, &fx.files, &NullObserver);

        let mut document = Document::parse(r#"<link href="/a.css">"#);
        pipeline.process(&mut document).await;

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
