//! Decides which entries a worker follows or delivers.

use globset::{Glob, GlobSet, GlobSetBuilder};

use xmlcrawl_core::{CrawlConfig, CrawlError};

/// Entry filter compiled from a [`CrawlConfig`].
#[derive(Debug, Clone)]
pub struct EntryFilter {
    config: CrawlConfig,
    exclude: GlobSet,
}

impl EntryFilter {
    /// Compile the filter. Fails on an invalid exclude pattern.
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            let glob = Glob::new(pattern).map_err(|e| CrawlError::InvalidConfig {
                message: format!("bad exclude pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let exclude = builder.build().map_err(|e| CrawlError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            config: config.clone(),
            exclude,
        })
    }

    /// Whether a subdirectory named `name` at `depth` should be enqueued.
    pub fn descend(&self, name: &str, depth: u32) -> bool {
        !self.config.should_skip_hidden(name)
            && self.config.within_depth(depth)
            && !self.exclude.is_match(name)
    }

    /// Whether a file named `name` should be read and delivered.
    pub fn accept_file(&self, name: &str) -> bool {
        !self.config.should_skip_hidden(name) && self.config.matches_extension(name)
    }
}
