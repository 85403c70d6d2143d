use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::fetcher::{FetchConfig, DEFAULT_USER_AGENT};
use crate::session::{MirrorOptions, DEFAULT_HTMLFILE, DEFAULT_RESDIR};

#[derive(Parser, Debug)]
#[command(
    name = "page-mirror",
    about = "Mirror a single web page and its embedded resources to local disk",
    version,
    long_about = "Downloads one page together with the scripts, images, stylesheets and icons it references, rewrites the markup to point at the local copies and writes a url-log.json manifest of everything fetched."
)]
pub struct MirrorCommand {
    /// The URL of the page to mirror
    pub urls: Vec<String>,

    /// Directory to store the page in (defaults to the URL's host)
    #[arg(short = 'd', long)]
    pub destination: Option<PathBuf>,

    /// File name for the rewritten page
    #[arg(short = 'f', long, default_value = DEFAULT_HTMLFILE)]
    pub htmlfile: String,

    /// Name of the resources directory inside the destination
    #[arg(long, default_value = DEFAULT_RESDIR)]
    pub resdir: String,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Connect and read timeout for each request, in seconds
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Maximum concurrent resource downloads
    #[arg(short = 'c', long, default_value = "4", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrent: u64,

    /// Do not follow HTTP redirects
    #[arg(long)]
    pub no_follow_redirects: bool,

    /// Print every selector, resolution and rewrite
    #[arg(short, long)]
    pub verbose: bool,
}

/// What the command line asks for.
#[derive(Debug, PartialEq)]
pub enum Invocation {
    Usage,
    Mirror(Url),
}

impl MirrorCommand {
    pub fn invocation(&self) -> Result<Invocation> {
        match self.urls.as_slice() {
            [] => Ok(Invocation::Usage),
            [url] => {
                let url = Url::parse(url).with_context(|| format!("Failed to parse URL: {}", url))?;
                Ok(Invocation::Mirror(url))
            }
            _ => bail!("can only process one URL at a time!"),
        }
    }

    pub fn usage() -> String {
        Self::command().render_usage().to_string()
    }

    pub fn mirror_options(&self, url: &Url) -> Result<MirrorOptions> {
        let destination = match &self.destination {
            Some(destination) => destination.clone(),
            None => PathBuf::from(
                url.host_str()
                    .with_context(|| format!("URL has no host to name the destination after: {}", url))?,
            ),
        };

        Ok(MirrorOptions {
            destination,
            htmlfile: self.htmlfile.clone(),
            resdir: self.resdir.clone(),
            max_concurrent: self.max_concurrent as usize,
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout),
            follow_redirects: !self.no_follow_redirects,
        }
    }
}
