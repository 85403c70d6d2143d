use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

use page_mirror::{ConsoleReporter, HttpFetcher, Invocation, MirrorCommand, MirrorSession};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();

    let url = match args.invocation()? {
        Invocation::Usage => {
            println!("{}", MirrorCommand::usage());
            return Ok(());
        }
        Invocation::Mirror(url) => url,
    };

    let options = args.mirror_options(&url)?;
    let destination = options.destination.clone();
    let fetcher = HttpFetcher::new(&args.fetch_config()).context("Failed to set up HTTP client")?;
    let session = MirrorSession::new(url.as_str(), options)?;

    println!("📁 Output directory: {:?}", destination);

    let reporter = ConsoleReporter::new(args.verbose);
    let result = session.run(&fetcher, &reporter).await;
    reporter.finish();

    let report = result.with_context(|| format!("Mirroring {} failed", url))?;

    println!(
        "✅ Mirrored {} ({} references, {} rewritten, {} reused, {} failed)",
        url.as_str().blue(),
        report.references,
        report.rewritten,
        report.reused,
        report.failed.to_string().yellow()
    );
    Ok(())
}
