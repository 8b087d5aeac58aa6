//! Link discoverer - the URL harvesting crawl
//!
//! This module walks the fixed page topology of the statistics site:
//! - events: one "show all" listing page
//! - fighters: 26 alphabetic index pages
//! - fights: every event page listed in `event_urls.csv`, with checkpoints
//!
//! Requests are strictly sequential with a fixed courtesy delay between
//! them. Failed pages are recorded in the run summary and skipped.

use crate::config::Config;
use crate::crawler::parser::{extract_links, LinkMarker, ParseError};
use crate::crawler::FetchClient;
use crate::state::{CheckpointStore, DiscoveryCheckpoint, RunSummary};
use crate::storage;
use crate::ScrapeError;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// The record types whose URLs are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Event,
    Fight,
    Fighter,
}

impl EntityKind {
    /// Discovery order: fights depend on the event list
    pub const ALL: [EntityKind; 3] = [Self::Event, Self::Fight, Self::Fighter];

    /// Run name; also the stem of the URL list and checkpoint files
    pub fn run_name(&self) -> &'static str {
        match self {
            Self::Event => "event_urls",
            Self::Fight => "fight_urls",
            Self::Fighter => "fighter_urls",
        }
    }

    pub fn url_list_file(&self) -> String {
        format!("{}.csv", self.run_name())
    }

    /// Table the page scrapers write records of this kind to
    pub fn table_file(&self) -> &'static str {
        match self {
            Self::Event => "ufc_event_data.csv",
            Self::Fight => "ufc_fight_data.csv",
            Self::Fighter => "ufc_fighter_data.csv",
        }
    }

    /// Column of [`Self::table_file`] holding each record's source URL
    pub fn url_column(&self) -> &'static str {
        match self {
            Self::Event => "event_url",
            Self::Fight => "fight_url",
            Self::Fighter => "fighter_url",
        }
    }

    pub fn marker(&self) -> LinkMarker {
        match self {
            Self::Event => LinkMarker::EVENT,
            Self::Fight => LinkMarker::FIGHT,
            Self::Fighter => LinkMarker::FIGHTER,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Event => "event",
            Self::Fight => "fight",
            Self::Fighter => "fighter",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "event" | "events" => Ok(Self::Event),
            "fight" | "fights" => Ok(Self::Fight),
            "fighter" | "fighters" => Ok(Self::Fighter),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// A discovered record URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkRecord {
    pub kind: EntityKind,
    pub url: String,
}

/// Result of one discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub kind: EntityKind,
    /// Links extracted before deduplication
    pub found: usize,
    /// Links that survived deduplication and exclusion
    pub links: Vec<LinkRecord>,
    /// Whether the URL list file was (re)written
    pub written: bool,
    pub output: PathBuf,
    pub summary: RunSummary,
}

/// Drives the discovery runs
pub struct Discoverer {
    config: Config,
    client: FetchClient,
    base_url: Url,
    delay: Duration,
}

impl Discoverer {
    /// Creates a discoverer with a client built from `config.http`
    pub fn new(config: Config) -> Result<Self, ScrapeError> {
        let client = FetchClient::new(&config.http)?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: Config, client: FetchClient) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(&config.site.base_url)?;
        let delay = Duration::from_millis(config.discovery.request_delay_ms);

        Ok(Self {
            config,
            client,
            base_url,
            delay,
        })
    }

    /// The "show all" completed-events listing
    pub fn event_listing_url(&self) -> Result<String, ScrapeError> {
        Ok(self
            .base_url
            .join("/statistics/events/completed?page=all")?
            .to_string())
    }

    /// One fighter index page per letter
    pub fn fighter_index_urls(&self) -> Result<Vec<String>, ScrapeError> {
        ('a'..='z')
            .map(|letter| {
                let path = format!("/statistics/fighters?char={}&page=all", letter);
                Ok(self.base_url.join(&path)?.to_string())
            })
            .collect()
    }

    pub fn url_list_path(&self, kind: EntityKind) -> PathBuf {
        self.config.paths.url_dir.join(kind.url_list_file())
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(
            self.config.paths.checkpoint_dir.clone(),
            EntityKind::Fight.run_name(),
        )
    }

    /// Parent pages a run would fetch, without fetching anything
    pub fn planned_pages(&self, kind: EntityKind) -> Result<Vec<String>, ScrapeError> {
        match kind {
            EntityKind::Event => Ok(vec![self.event_listing_url()?]),
            EntityKind::Fighter => self.fighter_index_urls(),
            EntityKind::Fight => self.load_event_parents(),
        }
    }

    /// Runs the discovery for one kind
    pub async fn discover(&self, kind: EntityKind) -> Result<DiscoveryReport, ScrapeError> {
        match kind {
            EntityKind::Event => self.discover_events().await,
            EntityKind::Fight => self.discover_fights().await,
            EntityKind::Fighter => self.discover_fighters().await,
        }
    }

    /// Runs every discovery in order
    ///
    /// A failing run (missing input, broken checkpoint) is logged and does
    /// not stop the remaining runs.
    pub async fn discover_all(&self) -> Vec<Result<DiscoveryReport, ScrapeError>> {
        let mut results = Vec::with_capacity(EntityKind::ALL.len());

        for kind in EntityKind::ALL {
            tracing::info!("Getting {} URLs...", kind);
            let result = self.discover(kind).await;
            if let Err(e) = &result {
                tracing::error!("{} URL discovery failed: {}", kind, e);
            }
            results.push(result);
        }

        results
    }

    /// Harvests event links from the completed-events listing
    pub async fn discover_events(&self) -> Result<DiscoveryReport, ScrapeError> {
        let kind = EntityKind::Event;
        let exclude = self.exclusion_set(kind)?;
        let mut summary = RunSummary::new(kind.run_name());

        let listing = self.event_listing_url()?;
        tracing::info!("Starting to scrape event links from {}", listing);

        let links = match self.harvest_page(&listing, &kind.marker()).await {
            Ok(links) if links.is_empty() => {
                let e = ParseError::NoLinks {
                    url: listing.clone(),
                    marker: kind.marker().to_string(),
                };
                summary.record_skip(&listing, e);
                Vec::new()
            }
            Ok(links) => {
                summary.record_done(&listing, links.len());
                links
            }
            Err(e) => {
                summary.record_skip(&listing, e);
                Vec::new()
            }
        };

        tracing::info!("Found {} event URLs", links.len());
        self.finalize(kind, links, &exclude, summary)
    }

    /// Harvests fighter links from the 26 alphabetic index pages
    pub async fn discover_fighters(&self) -> Result<DiscoveryReport, ScrapeError> {
        let kind = EntityKind::Fighter;
        let exclude = self.exclusion_set(kind)?;
        let mut summary = RunSummary::new(kind.run_name());

        let pages = self.fighter_index_urls()?;
        let total = pages.len();
        let mut links = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            tracing::info!("Requesting fighters page {} ({}/{})", page, index + 1, total);

            match self.harvest_page(page, &kind.marker()).await {
                Ok(found) => {
                    tracing::debug!("Found {} fighters on page {}", found.len(), index + 1);
                    summary.record_done(page, found.len());
                    links.extend(found);
                }
                Err(e) => summary.record_skip(page, e),
            }

            if index + 1 < total {
                self.pause().await;
            }
        }

        self.finalize(kind, links, &exclude, summary)
    }

    /// Fans out over the event pages, checkpointing as it goes
    pub async fn discover_fights(&self) -> Result<DiscoveryReport, ScrapeError> {
        let kind = EntityKind::Fight;
        let parents = self.load_event_parents()?;
        tracing::info!("Loaded {} event URLs from file", parents.len());

        let exclude = self.exclusion_set(kind)?;
        let store = self.checkpoint_store();
        let mut checkpoint = self.resume_or_start(&store, &parents)?;
        let mut summary = RunSummary::new(kind.run_name());

        let total = parents.len();
        let every = self.config.discovery.checkpoint_every.max(1);
        let start = checkpoint.cursor;

        if start > 0 {
            tracing::info!(
                "Resuming from checkpoint: {}/{} events processed, {} URLs already collected",
                start,
                total,
                checkpoint.collected.len()
            );
        }

        for (index, parent) in parents.iter().enumerate().skip(start) {
            let position = index + 1;

            if position % 50 == 0 || index == start {
                tracing::info!(
                    "Processing event {}/{} ({:.1}%)",
                    position,
                    total,
                    position as f64 / total as f64 * 100.0
                );
            } else {
                tracing::debug!("Processing event {}/{}: {}", position, total, parent);
            }

            match self.harvest_page(parent, &kind.marker()).await {
                Ok(found) => {
                    tracing::debug!("Found {} fights in event {}", found.len(), position);
                    summary.record_done(parent, found.len());
                    checkpoint.collected.extend(found);
                }
                Err(e) => summary.record_skip(parent, e),
            }

            checkpoint.cursor = position;

            if position < total {
                if position % every == 0 {
                    store.save(&checkpoint)?;
                }
                self.pause().await;
            }
        }

        store.save(&checkpoint)?;

        tracing::info!(
            "{} fight links collected from {} events",
            checkpoint.collected.len(),
            total
        );
        self.finalize(kind, checkpoint.collected, &exclude, summary)
    }

    fn load_event_parents(&self) -> Result<Vec<String>, ScrapeError> {
        let path = self.url_list_path(EntityKind::Event);
        if !path.exists() {
            return Err(ScrapeError::MissingInput { path });
        }
        Ok(storage::read_url_list(&path)?)
    }

    /// Loads the checkpoint for `parents`, or starts a fresh one
    fn resume_or_start(
        &self,
        store: &CheckpointStore,
        parents: &[String],
    ) -> Result<DiscoveryCheckpoint, ScrapeError> {
        let fresh = DiscoveryCheckpoint::fresh(parents);

        let Some(mut checkpoint) = store.load()? else {
            return Ok(fresh);
        };

        if checkpoint.is_complete() {
            tracing::info!(
                "Previous checkpoint finished all {} events, starting over",
                checkpoint.cursor
            );
            return Ok(fresh);
        }

        if !checkpoint.belongs_to(parents) {
            tracing::warn!(
                "Checkpoint in {} was taken over a different event list, starting over",
                store.state_path().display()
            );
            return Ok(fresh);
        }

        checkpoint.parents_total = fresh.parents_total;
        checkpoint.parents_digest = fresh.parents_digest;
        Ok(checkpoint)
    }

    /// URLs already present in the persisted table for `kind`, counting
    /// the rows the normalizer parked beside it
    fn exclusion_set(&self, kind: EntityKind) -> Result<HashSet<String>, ScrapeError> {
        let table = self.config.paths.raw_dir.join(kind.table_file());
        let mut known = storage::read_column(&table, kind.url_column())?.unwrap_or_default();

        // Rows the normalizer parked are still known records
        let parked = storage::rejected_path(&table);
        if let Some(urls) = storage::read_column(&parked, kind.url_column())? {
            known.extend(urls);
        }

        if !known.is_empty() {
            tracing::debug!(
                "{} {} URLs already present in {}",
                known.len(),
                kind,
                table.display()
            );
        }
        Ok(known)
    }

    /// Fetches one page and extracts the marked links
    async fn harvest_page(
        &self,
        url: &str,
        marker: &LinkMarker,
    ) -> Result<Vec<String>, ScrapeError> {
        let response = self.client.fetch(url).await?;

        if !response.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        let base = Url::parse(url)?;
        Ok(extract_links(&response.body, &base, marker)?)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Dedupes, drops known URLs and writes the list if anything is new
    fn finalize(
        &self,
        kind: EntityKind,
        links: Vec<String>,
        exclude: &HashSet<String>,
        summary: RunSummary,
    ) -> Result<DiscoveryReport, ScrapeError> {
        let found = links.len();
        let urls = dedupe_links(links, exclude);
        let output = self.url_list_path(kind);

        let written = if urls.is_empty() {
            tracing::info!(
                "No new {} URLs found ({} seen); leaving {} untouched",
                kind,
                found,
                output.display()
            );
            false
        } else {
            storage::write_url_list(&output, &urls)?;
            tracing::info!("Saved {} new {} URLs to {}", urls.len(), kind, output.display());
            true
        };

        summary.log();

        Ok(DiscoveryReport {
            kind,
            found,
            links: urls
                .into_iter()
                .map(|url| LinkRecord { kind, url })
                .collect(),
            written,
            output,
            summary,
        })
    }
}

/// Keeps the first occurrence of each URL not in `exclude`, in order
pub fn dedupe_links(links: Vec<String>, exclude: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|url| !exclude.contains(url) && seen.insert(url.clone()))
        .collect()
}
