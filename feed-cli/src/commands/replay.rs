//! Replay a scripted session.

use anyhow::{Context, Result};
use feed_client::{EngineConfig, LoadOutcome, MockStreamSource, TimelineEngine};
use feed_core::{FlushOutcome, StreamState, TimelineSnapshot};
use feed_types::FeedError;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::fixture::{Fixture, FixtureSource, Step};

/// How long a `stream` step waits for its frames to be applied.
const STREAM_WAIT: Duration = Duration::from_secs(5);

type Engine = TimelineEngine<FixtureSource, MockStreamSource>;

/// Output options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Mark the timeline as on screen before starting.
    pub visible: bool,
    /// Print JSON lines instead of text.
    pub json: bool,
}

/// What one step did and the state it left behind.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step name.
    pub step: String,
    /// Human-readable outcome.
    pub outcome: String,
    /// Active filter title.
    pub filter: String,
    /// Timeline generation.
    pub generation: u64,
    /// Entry ids, newest first.
    pub ids: Vec<String>,
    /// Withheld entries.
    pub pending: usize,
    /// Older pages may exist.
    pub has_more: bool,
    /// Failure banner.
    pub last_error: Option<String>,
    /// Stream frames applied.
    pub processed: u64,
    /// Stream frames dropped.
    pub dropped: u64,
    /// Stream connection state.
    pub stream: String,
}

impl StepReport {
    fn new(step: &str, outcome: String, snapshot: &TimelineSnapshot) -> Self {
        Self {
            step: step.to_string(),
            outcome,
            filter: snapshot.filter.title(),
            generation: snapshot.generation,
            ids: snapshot.entries.iter().map(|e| e.id.to_string()).collect(),
            pending: snapshot.pending_count,
            has_more: snapshot.has_more,
            last_error: snapshot.last_error.clone(),
            processed: snapshot.processed_events,
            dropped: snapshot.dropped_events,
            stream: snapshot.stream.to_string(),
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
            return Ok(());
        }

        println!("== {}: {}", self.step, self.outcome);
        println!(
            "   filter={} generation={} entries={} pending={} has_more={} stream={}",
            self.filter,
            self.generation,
            self.ids.len(),
            self.pending,
            self.has_more,
            self.stream
        );
        if let Some(error) = &self.last_error {
            println!("   error: {}", error);
        }
        if self.dropped > 0 {
            println!("   dropped frames: {}", self.dropped);
        }
        println!("   ids: {}", self.ids.join(" "));
        Ok(())
    }
}

/// Run the replay command.
pub async fn run(fixture_path: &Path, config_path: Option<&Path>, options: Options) -> Result<()> {
    let fixture = Fixture::load(fixture_path)?;
    let config = match config_path {
        Some(path) => EngineConfig::load(path).context("Failed to load config")?,
        None => EngineConfig::default(),
    };

    let reports = replay(fixture, config, options.visible).await?;
    for report in &reports {
        report.print(options.json)?;
    }
    Ok(())
}

/// Play a fixture through a fresh engine and collect one report per step,
/// starting with the implicit `start`.
pub async fn replay(fixture: Fixture, config: EngineConfig, visible: bool) -> Result<Vec<StepReport>> {
    let stream = MockStreamSource::new();
    let engine: Engine = TimelineEngine::new(
        config,
        FixtureSource::new(fixture.pages),
        stream.clone(),
        fixture.filter,
    );
    let mut frames = fixture.stream.into_iter();
    let mut reports = Vec::with_capacity(fixture.steps.len() + 1);

    engine.set_visible(visible).await;
    let started = engine.start().await;
    reports.push(StepReport::new("start", describe_load(&started), &engine.snapshot()));

    for step in fixture.steps {
        let (name, outcome) = match step {
            Step::Refresh => ("refresh", describe_load(&engine.pull_to_refresh().await)),
            Step::Older => ("older", describe_load(&engine.load_older().await)),
            Step::Newer => ("newer", describe_load(&engine.load_newer().await)),
            Step::Foreground => ("foreground", describe_load(&engine.on_foreground().await)),
            Step::Filter { filter } => ("filter", describe_load(&engine.set_filter(filter).await)),
            Step::Scroll { lo, hi } => {
                let prefetch = engine.visible_range_changed(lo, hi).await;
                let outcome = match prefetch.load {
                    Some(handle) => {
                        let result = handle.await.context("Prefetch task failed")?;
                        format!("prefetched, {}", describe_load(&result))
                    }
                    None => "no prefetch".to_string(),
                };
                ("scroll", format!("{} ({} warm)", outcome, prefetch.warm.len()))
            }
            Step::Stream { count } => {
                let delivered = deliver(&engine, &stream, &mut frames, count).await?;
                ("stream", format!("{} frames delivered", delivered))
            }
            Step::Flush => ("flush", describe_flush(&engine.flush_pending().await)),
            Step::Visible { visible } => {
                engine.set_visible(visible).await;
                let outcome = if visible { "shown" } else { "hidden" };
                ("visible", outcome.to_string())
            }
        };
        reports.push(StepReport::new(name, outcome, &engine.snapshot()));
    }

    engine.shutdown().await;
    Ok(reports)
}

/// Push up to `count` frames and wait until the engine has applied them.
async fn deliver(
    engine: &Engine,
    stream: &MockStreamSource,
    frames: &mut impl Iterator<Item = String>,
    count: usize,
) -> Result<usize> {
    let mut changes = engine.subscribe_changes();
    tokio::time::timeout(STREAM_WAIT, changes.wait_for(|s| s.stream == StreamState::Connected))
        .await
        .context("Timed out waiting for the stream to connect")?
        .context("Engine stopped")?;

    let before = {
        let snapshot = changes.borrow();
        snapshot.processed_events + snapshot.dropped_events
    };
    let mut delivered = 0;
    for text in frames.take(count) {
        stream.push_frame(text);
        delivered += 1;
    }

    let target = before + delivered as u64;
    tokio::time::timeout(
        STREAM_WAIT,
        changes.wait_for(|s| s.processed_events + s.dropped_events >= target),
    )
    .await
    .context("Timed out waiting for stream frames")?
    .context("Engine stopped")?;

    Ok(delivered)
}

fn describe_load(result: &Result<LoadOutcome, FeedError>) -> String {
    match result {
        Ok(LoadOutcome::Applied {
            kind,
            returned,
            inserted,
        }) => format!("applied {} ({} returned, {} inserted)", kind, returned, inserted),
        Ok(LoadOutcome::AlreadyInProgress(kind)) => format!("{} load already in progress", kind),
        Ok(LoadOutcome::NoMoreData) => "no more data".to_string(),
        Ok(LoadOutcome::NotLoaded) => "not loaded".to_string(),
        Ok(LoadOutcome::Stale { captured, current }) => format!(
            "stale result discarded (generation {}, current {})",
            captured, current
        ),
        Err(e) => format!("failed: {}", e),
    }
}

fn describe_flush(outcome: &FlushOutcome) -> String {
    match &outcome.anchor {
        Some(anchor) => format!(
            "revealed {}, anchor {} at {}",
            outcome.count, anchor.entry_id, anchor.offset_index
        ),
        None => format!("revealed {}", outcome.count),
    }
}
