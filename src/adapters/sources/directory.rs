//! Directory event source.
//!
//! Files in a directory whose names match a glob become invocations: the file
//! content is the input and `FILE_PATH`/`FILE_NAME` are set in its environment.
//! Existing files are dispatched first. In watch mode the directory is then
//! observed for new files, each dispatched once it has been quiet for the
//! stability delay. The watcher is registered before the initial scan, so a
//! file created in between is still seen; paths are dispatched at most once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::dispatch::Dispatcher;
use crate::config::ConfigSource;
use crate::core::{Context, EventSource, Invoker};
use crate::domain::Input;

pub const MODULE_PATH: &str = "builtin/directory";
pub const SYMBOL: &str = "DirectorySource";

pub const SOURCE_DIR: &str = "SOURCE_DIR";
pub const SOURCE_DIR_PATTERN: &str = "SOURCE_DIR_PATTERN";
pub const SOURCE_DIR_WATCH: &str = "SOURCE_DIR_WATCH";
pub const SOURCE_DIR_STABILITY_MILLIS: &str = "SOURCE_DIR_STABILITY_MILLIS";

const DEFAULT_STABILITY_MILLIS: u64 = 2000;

/// Settings for the directory source
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Directory to read inputs from
    pub dir: PathBuf,

    /// Glob applied to file names (not paths)
    pub pattern: Pattern,

    /// Keep watching for new files after the initial scan
    pub watch: bool,

    /// How long a new file must be unchanged before it is dispatched
    pub stability_delay: Duration,
}

impl DirectoryConfig {
    pub fn from_source(config: &dyn ConfigSource) -> Result<Self> {
        let dir = config
            .value(SOURCE_DIR)
            .map(PathBuf::from)
            .with_context(|| format!("{} is required for {}", SOURCE_DIR, MODULE_PATH))?;
        if !dir.is_dir() {
            anyhow::bail!("Source directory does not exist: {}", dir.display());
        }

        let raw_pattern = config
            .value(SOURCE_DIR_PATTERN)
            .unwrap_or_else(|| "*".to_string());
        let pattern = Pattern::new(&raw_pattern)
            .with_context(|| format!("Invalid {}: {}", SOURCE_DIR_PATTERN, raw_pattern))?;

        let watch = config
            .value(SOURCE_DIR_WATCH)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let stability_millis = config
            .value(SOURCE_DIR_STABILITY_MILLIS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STABILITY_MILLIS);

        Ok(Self {
            dir,
            pattern,
            watch,
            stability_delay: Duration::from_millis(stability_millis),
        })
    }
}

/// Live watch on the source directory; events queue up until received
pub struct DirectoryWatch {
    // Dropping the debouncer stops the watch
    _debouncer: Debouncer<RecommendedWatcher>,
    events: mpsc::Receiver<PathBuf>,
}

impl DirectoryWatch {
    /// Next changed path, or `None` once the watcher has shut down
    pub async fn next_path(&mut self) -> Option<PathBuf> {
        self.events.recv().await
    }
}

pub struct DirectorySource {
    config: DirectoryConfig,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.config.pattern.matches(name))
            .unwrap_or(false)
    }

    /// Matching files currently in the directory, sorted by path
    pub async fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", self.config.dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.matches(&path) {
                continue;
            }
            match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => found.push(path),
                _ => continue,
            }
        }

        found.sort();
        Ok(found)
    }

    /// Register a watcher on the directory. Changes are buffered from here on.
    pub fn start_watch(&self) -> Result<DirectoryWatch> {
        let (tx, events) = mpsc::channel::<PathBuf>(100);

        let mut debouncer = new_debouncer(self.config.stability_delay, move |res: DebounceEventResult| {
            match res {
                Ok(events) => {
                    for event in events {
                        if tx.blocking_send(event.path).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!("Watcher error: {:?}", e),
            }
        })
        .context("Failed to create directory watcher")?;
        debouncer
            .watcher()
            .watch(&self.config.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.config.dir.display()))?;

        info!(dir = %self.config.dir.display(), "Watching for new files");
        Ok(DirectoryWatch {
            _debouncer: debouncer,
            events,
        })
    }

    async fn follow(
        &self,
        ctx: &Context,
        watch: &mut DirectoryWatch,
        seen: &mut HashSet<PathBuf>,
        dispatcher: &mut Dispatcher,
    ) {
        while !dispatcher.has_failed() {
            tokio::select! {
                biased;
                _ = ctx.done() => {
                    info!("Directory watch cancelled");
                    return;
                }
                _ = dispatcher.settle_next(), if dispatcher.in_flight() > 0 => {}
                next = watch.next_path() => {
                    let Some(path) = next else { return };
                    if !self.matches(&path) || !path.is_file() || !seen.insert(path.clone()) {
                        continue;
                    }
                    submit(dispatcher, path).await;
                }
            }
        }
    }
}

#[async_trait]
impl EventSource for DirectorySource {
    async fn run(&self, ctx: Context, invoker: Arc<dyn Invoker>) -> Result<()> {
        let mut watch = match self.config.watch {
            true => Some(self.start_watch()?),
            false => None,
        };

        let mut seen = HashSet::new();
        let mut dispatcher = Dispatcher::new(ctx.clone(), invoker);
        for path in self.scan().await? {
            seen.insert(path.clone());
            submit(&mut dispatcher, path).await;
        }
        info!(count = dispatcher.dispatched(), dir = %self.config.dir.display(), "Existing files dispatched");

        if let Some(watch) = watch.as_mut() {
            self.follow(&ctx, watch, &mut seen, &mut dispatcher).await;
        }

        dispatcher.finish().await.map(|_| ())
    }
}

async fn submit(dispatcher: &mut Dispatcher, path: PathBuf) {
    let label = path.display().to_string();
    dispatcher.submit(label, async move { input_for(&path).await }).await;
}

async fn input_for(path: &Path) -> Result<Input> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Input::new(data)
        .with_env("FILE_PATH", path.to_string_lossy())
        .with_env("FILE_NAME", name))
}
