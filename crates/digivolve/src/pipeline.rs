use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::fetcher::{BrowserConfig, ChromeFetcher, FetchError, PageFetcher, with_browser};
use crate::parser::extract;
use crate::sink::{CheckpointSink, SinkError};
use crate::source::{LoadError, load_entities};
use crate::types::{Entity, EvolutionRecord, Strategy};
use crate::utils::entity_url;

/// Why an entity contributed nothing to the run.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
    #[error("Interrupted")]
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to load entities: {0}")]
    Load(#[from] LoadError),
    #[error("Failed to start browser: {0}")]
    Fetch(#[from] FetchError),
    #[error("Failed to save results: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: String,
    pub output: PathBuf,
    pub checkpoint_every: usize,
    pub delay: Duration,
    /// Forces one strategy for every entity instead of choosing by stage.
    pub strategy: Option<Strategy>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            output: PathBuf::from("./database/evolutions.json"),
            checkpoint_every: 10,
            delay: Duration::from_secs(1),
            strategy: None,
        }
    }
}

impl RunConfig {
    pub fn validate(self) -> Result<Self, String> {
        if self.checkpoint_every == 0 {
            return Err("Checkpoint interval must be greater than 0".to_string());
        }
        if self.base_url.trim().is_empty() {
            return Err("Base URL must not be empty".to_string());
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub empty: usize,
    pub records: usize,
    pub interrupted: bool,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Processed: {}/{}", self.processed, self.total)?;
        writeln!(f, "  No data:   {}", self.empty)?;
        writeln!(f, "  Skipped:   {}", self.skipped)?;
        writeln!(f, "  Records:   {}", self.records)?;
        if self.interrupted {
            writeln!(f, "  (interrupted)")?;
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic during extraction".to_string())
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: RunConfig,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn new_sink(&self) -> CheckpointSink {
        CheckpointSink::new(&self.config.output)
    }

    pub fn strategy_for(&self, entity: &Entity) -> Strategy {
        self.config
            .strategy
            .unwrap_or_else(|| Strategy::for_stage(entity.stage.as_ref()))
    }

    /// Fetches and extracts one entity. An empty vector means the page had no
    /// section of the expected kind. A panic anywhere in fetching or
    /// extraction is reported as `SkipReason::Unexpected`.
    pub async fn process_entity<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &mut F,
        entity: &Entity,
    ) -> Result<Vec<EvolutionRecord>, SkipReason> {
        AssertUnwindSafe(self.fetch_and_extract(fetcher, entity))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(SkipReason::Unexpected(panic_message(payload))))
    }

    /// Like `process_entity`, but gives up with `SkipReason::Interrupted` as
    /// soon as `cancel` fires.
    pub async fn process_cancellable<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &mut F,
        entity: &Entity,
        cancel: &CancellationToken,
    ) -> Result<Vec<EvolutionRecord>, SkipReason> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SkipReason::Interrupted),
            outcome = self.process_entity(fetcher, entity) => outcome,
        }
    }

    async fn fetch_and_extract<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &mut F,
        entity: &Entity,
    ) -> Result<Vec<EvolutionRecord>, SkipReason> {
        let url = entity_url(&self.config.base_url, &entity.name);
        let strategy = self.strategy_for(entity);
        log::info!("Fetching {} with {} strategy ({})", entity.name, strategy, url);

        let html = fetcher.fetch(&url).await?;

        panic::catch_unwind(AssertUnwindSafe(|| extract(&html, &entity.name, strategy)))
            .map_err(|payload| SkipReason::Unexpected(panic_message(payload)))
    }

    /// Processes `entities` in order, saving the accumulated records every
    /// `checkpoint_every` entities and once more before returning. A failing
    /// entity is logged and skipped. Cancelling `cancel` stops the loop at the
    /// next entity boundary or during the delay.
    pub async fn run<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &mut F,
        entities: &[Entity],
        sink: &mut CheckpointSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, SinkError> {
        let total = entities.len();
        let mut summary = RunSummary {
            total,
            ..Default::default()
        };

        for (i, entity) in entities.iter().enumerate() {
            let position = i + 1;
            log::info!("Processing {}/{}: {}", position, total, entity);

            let outcome = match self.process_cancellable(fetcher, entity, cancel).await {
                Err(SkipReason::Interrupted) => {
                    summary.interrupted = true;
                    break;
                }
                outcome => outcome,
            };

            summary.processed += 1;
            match outcome {
                Ok(records) if records.is_empty() => {
                    summary.empty += 1;
                    log::info!("No data for {}", entity.name);
                }
                Ok(records) => {
                    log::info!("Found {} record(s) for {}", records.len(), entity.name);
                    for record in &records {
                        log::debug!("  {}", record);
                    }
                    sink.extend(records);
                }
                Err(reason) => {
                    summary.skipped += 1;
                    log::warn!("Skipping {}: {}", entity.name, reason);
                }
            }

            if position % self.config.checkpoint_every == 0 {
                log::info!("Saving progress... ({}/{})", position, total);
                if let Err(e) = sink.checkpoint() {
                    log::error!("Checkpoint failed: {}", e);
                }
            }

            if position < total && !self.config.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.delay) => {}
                }
            }
        }

        if summary.interrupted {
            log::warn!("Run interrupted. Saving current progress...");
        }

        log::info!("Saving final results...");
        sink.checkpoint()?;
        summary.records = sink.len();
        log::info!(
            "Saved {} evolution entries to {}",
            summary.records,
            sink.path().display()
        );

        Ok(summary)
    }
}

/// Loads `input`, scrapes every entity in one browser session and saves the
/// results to the configured output.
pub async fn scrape_file(
    input: &Path,
    config: RunConfig,
    browser: BrowserConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary, RunError> {
    let entities = load_entities(input)?;
    log::info!("Found {} entities to process", entities.len());

    let pipeline = Pipeline::new(config);
    let mut sink = pipeline.new_sink();

    let summary = with_browser(browser, async |fetcher: &mut ChromeFetcher| {
        pipeline.run(fetcher, &entities, &mut sink, cancel).await
    })
    .await??;

    Ok(summary)
}

/// Scrapes a single entity without touching the output file. Returns `None`
/// when `cancel` fired before the entity finished.
pub async fn scrape_one(
    entity: &Entity,
    config: RunConfig,
    browser: BrowserConfig,
    cancel: &CancellationToken,
) -> Result<Option<Vec<EvolutionRecord>>, RunError> {
    let pipeline = Pipeline::new(config);

    let outcome = with_browser(browser, async |fetcher: &mut ChromeFetcher| {
        pipeline.process_cancellable(fetcher, entity, cancel).await
    })
    .await?;

    match outcome {
        Ok(records) => Ok(Some(records)),
        Err(SkipReason::Interrupted) => {
            log::warn!("Interrupted while processing {}", entity.name);
            Ok(None)
        }
        Err(reason) => {
            log::warn!("Skipping {}: {}", entity.name, reason);
            Ok(Some(Vec::new()))
        }
    }
}
