use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Progress reported by a mirroring session.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    PageRequested { url: String },
    RuleStarted { selector: String },
    ReferenceResolved { raw: String, url: String },
    AlreadyMaterialized { url: String, local: PathBuf },
    Downloading { url: String },
    Stored { url: String, local: PathBuf, bytes: u64 },
    ResourceFailed { url: String, reason: String },
    Rewritten { from: String, to: String },
    DocumentWritten { path: PathBuf },
    ManifestWritten { path: PathBuf },
    ManifestFailed { reason: String },
}

/// Receives [`MirrorEvent`]s. The mirroring core never prints on its own.
#[cfg_attr(test, mockall::automock)]
pub trait MirrorObserver {
    fn notify(&self, event: &MirrorEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl MirrorObserver for NullObserver {
    fn notify(&self, _event: &MirrorEvent) {}
}

/// Terminal output for the CLI: one status line per event plus a spinner for
/// the download in flight. The spinner stays hidden when stderr is not a
/// terminal.
pub struct ConsoleReporter {
    spinner: ProgressBar,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        let spinner = if console::Term::stderr().features().is_attended() {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        } else {
            ProgressBar::hidden()
        };
        Self { spinner, verbose }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    fn line(&self, message: String) {
        if self.spinner.is_hidden() {
            eprintln!("{}", message);
        } else {
            self.spinner.println(message);
        }
    }
}

impl MirrorObserver for ConsoleReporter {
    fn notify(&self, event: &MirrorEvent) {
        match event {
            MirrorEvent::PageRequested { url } => {
                self.line(format!("🚀 Mirroring {}", url.blue()));
            }
            MirrorEvent::RuleStarted { selector } => {
                if self.verbose {
                    self.line(format!("🔍 Processing selector {}", selector.cyan()));
                }
            }
            MirrorEvent::ReferenceResolved { raw, url } => {
                if self.verbose {
                    self.line(format!("   {} -> {}", raw, url));
                }
            }
            MirrorEvent::AlreadyMaterialized { url, local } => {
                self.line(format!("⏭️  Already mirrored: {} ({})", url, local.display()));
            }
            MirrorEvent::Downloading { url } => {
                self.spinner.set_message(format!("Downloading: {}", url));
            }
            MirrorEvent::Stored { url, local, bytes } => {
                self.line(format!(
                    "📥 {} -> {} ({} bytes)",
                    url,
                    local.display().to_string().green(),
                    bytes
                ));
            }
            MirrorEvent::ResourceFailed { url, reason } => {
                self.line(format!("{} {}: {}", "⚠️  Skipping".yellow(), url, reason));
            }
            MirrorEvent::Rewritten { from, to } => {
                if self.verbose {
                    self.line(format!("✏️  Rewrote {} -> {}", from, to));
                }
            }
            MirrorEvent::DocumentWritten { path } => {
                self.line(format!("💾 Saved page to {}", path.display()));
            }
            MirrorEvent::ManifestWritten { path } => {
                self.line(format!("📄 Wrote URL log to {}", path.display()));
            }
            MirrorEvent::ManifestFailed { reason } => {
                self.line(format!("{} {}", "❌ Failed to write URL log:".red(), reason));
            }
        }
    }
}
