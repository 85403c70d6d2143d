use std::path::PathBuf;
use url::Url;

use crate::charset::PageText;
use crate::document::Document;
use crate::error::MirrorError;
use crate::fetcher::Fetcher;
use crate::file_manager::FileManager;
use crate::manifest::MirrorManifest;
use crate::observer::{MirrorEvent, MirrorObserver};
use crate::pipeline::{AssetPipeline, PipelineOutcome};
use crate::resolver::UrlResolver;
use crate::rules::RuleSet;

pub const DEFAULT_HTMLFILE: &str = "index.html";
pub const DEFAULT_RESDIR: &str = "res";

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub destination: PathBuf,
    pub htmlfile: String,
    pub resdir: String,
    pub max_concurrent: usize,
}

impl MirrorOptions {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            htmlfile: DEFAULT_HTMLFILE.to_string(),
            resdir: DEFAULT_RESDIR.to_string(),
            max_concurrent: 1,
        }
    }
}

/// Counts for one finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub references: usize,
    pub rewritten: usize,
    pub reused: usize,
    pub failed: usize,
    pub document: PathBuf,
    pub manifest: PathBuf,
}

/// Mirrors one page: fetch it, localize its resources, write the rewritten
/// markup and the URL manifest.
pub struct MirrorSession {
    root_url: Url,
    options: MirrorOptions,
    rules: RuleSet,
}

impl MirrorSession {
    pub fn new(root_url: &str, options: MirrorOptions) -> Result<Self, MirrorError> {
        let root_url = Url::parse(root_url).map_err(|source| MirrorError::InvalidUrl {
            url: root_url.to_string(),
            source,
        })?;

        Ok(Self {
            root_url,
            options,
            rules: RuleSet::builtin(),
        })
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn root_url(&self) -> &Url {
        &self.root_url
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Runs the session to completion.
    ///
    /// A failed page fetch aborts before anything is written. Once the page is
    /// in hand, the manifest is written on every exit path.
    pub async fn run<F: Fetcher>(
        &self,
        fetcher: &F,
        observer: &dyn MirrorObserver,
    ) -> Result<MirrorReport, MirrorError> {
        let page_url = self.root_url.as_str();
        observer.notify(&MirrorEvent::PageRequested {
            url: page_url.to_string(),
        });

        let page = match fetcher.fetch(page_url).await {
            Ok(response) => response.text().await,
            Err(e) => Err(e),
        }
        .map_err(MirrorError::PageFetch)?;

        let files = FileManager::new(&self.options.destination, &self.options.resdir);
        let mut manifest = MirrorManifest::new(page_url);

        let mirrored = self
            .mirror_page(&page, fetcher, observer, &files, &mut manifest)
            .await;
        let written = manifest.write(&files);

        match (mirrored, written) {
            (Ok((mut report, document)), Ok(manifest_path)) => {
                observer.notify(&MirrorEvent::ManifestWritten {
                    path: manifest_path.clone(),
                });
                report.document = document;
                report.manifest = manifest_path;
                Ok(report)
            }
            (Ok(_), Err(e)) => {
                observer.notify(&MirrorEvent::ManifestFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
            (Err(e), Ok(manifest_path)) => {
                observer.notify(&MirrorEvent::ManifestWritten { path: manifest_path });
                Err(e)
            }
            (Err(e), Err(manifest_err)) => {
                observer.notify(&MirrorEvent::ManifestFailed {
                    reason: manifest_err.to_string(),
                });
                Err(MirrorError::ManifestAfterFailure {
                    source: Box::new(e),
                    manifest: Box::new(manifest_err),
                })
            }
        }
    }

    async fn mirror_page<F: Fetcher>(
        &self,
        page: &PageText,
        fetcher: &F,
        observer: &dyn MirrorObserver,
        files: &FileManager,
        manifest: &mut MirrorManifest,
    ) -> Result<(MirrorReport, PathBuf), MirrorError> {
        let mut document = Document::parse(&page.text);
        // The page is written back as UTF-8
        if !page.is_utf8() {
            document.declare_utf8();
        }
        files.create_directories()?;

        let resolver = UrlResolver::new(self.root_url.clone());
        let pipeline = AssetPipeline::new(fetcher, &self.rules, &resolver, files, observer)
            .with_max_concurrent(self.options.max_concurrent);
        let PipelineOutcome {
            entries,
            rewritten,
            reused,
            failed,
        } = pipeline.process(&mut document).await;

        let references = entries.len();
        manifest.extend(entries);

        let rendered = document
            .to_html()
            .map_err(|e| MirrorError::io(files.base_dir().join(&self.options.htmlfile), e))?;
        let document_path = files.save_file(&self.options.htmlfile, rendered.as_bytes())?;
        observer.notify(&MirrorEvent::DocumentWritten {
            path: document_path.clone(),
        });

        let report = MirrorReport {
            references,
            rewritten,
            reused,
            failed,
            ..Default::default()
        };
        Ok((report, document_path))
    }
}
