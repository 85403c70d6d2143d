pub mod charset;
pub mod cli;
pub mod document;
pub mod error;
pub mod fetcher;
pub mod file_manager;
pub mod manifest;
pub mod naming;
pub mod observer;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod session;

// Re-export main types for convenience
pub use charset::PageText;
pub use cli::{Invocation, MirrorCommand};
pub use document::{Document, Element};
pub use error::{FetchError, MirrorError};
pub use fetcher::{FetchConfig, FetchResponse, Fetcher, HttpFetcher};
pub use file_manager::{FileManager, LocalAsset};
pub use manifest::{ManifestEntry, MirrorManifest, MANIFEST_FILE};
pub use naming::derive_filename;
pub use observer::{ConsoleReporter, MirrorEvent, MirrorObserver, NullObserver};
pub use pipeline::{AssetPipeline, PipelineOutcome};
pub use resolver::UrlResolver;
pub use rules::{NodeMatcher, PostProcessor, RuleSet, SelectorRule};
pub use session::{MirrorOptions, MirrorReport, MirrorSession};
