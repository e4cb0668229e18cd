//! The ingestion pipeline.
//!
//! One pass reads the world save, then every player save, builds the new
//! player list in a local vector, swaps it in whole, and publishes it.
//! Readers of [`Pipeline::players`] see either the previous list or the new
//! one, never a mix.
//!
//! A player file that downloads and decodes but fails projection is dropped
//! for the pass. A player whose file could not be reached keeps its previous
//! record while that record is inside the grace window.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use flate2::read::GzDecoder;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::{Config, IngestConfig, LogsConfig, ServerConfig};
use crate::events::{Event, EventBus};
use crate::identity::IdentityResolver;
use crate::model::{LogFile, PlayerRecord, QuarantineEntry, WorldSnapshot};
use crate::nbt;
use crate::projection::{self, ProjectionContext};
use crate::remote::{CachedFile, FileCache, RemoteError, join};
use crate::world;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = core::result::Result<T, IngestError>;

/// A player file that was inspected but produced no record.
#[derive(Debug, Clone, Serialize)]
pub struct PassFailure {
    pub path: String,
    pub error: String,
}

/// What one pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub world_read: bool,
    /// Records built from files read this pass.
    pub projected: usize,
    /// Previous records kept because their file was unreachable.
    pub retained: usize,
    /// Saves without mod data.
    pub skipped: usize,
    /// Files listed but not downloaded.
    pub unreachable: Vec<String>,
    pub failures: Vec<PassFailure>,
}

impl PassReport {
    pub fn total(&self) -> usize {
        self.projected + self.retained
    }
}

pub struct Pipeline {
    cache: FileCache,
    catalog: Arc<Catalog>,
    resolver: Arc<IdentityResolver>,
    bus: EventBus,
    server: ServerConfig,
    ingest: IngestConfig,
    logs: LogsConfig,
    players: RwLock<Arc<[PlayerRecord]>>,
    world: RwLock<Option<Arc<WorldSnapshot>>>,
}

impl Pipeline {
    pub fn new(
        cache: FileCache,
        catalog: Arc<Catalog>,
        resolver: Arc<IdentityResolver>,
        bus: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            cache,
            catalog,
            resolver,
            bus,
            server: config.server.clone(),
            ingest: config.ingest.clone(),
            logs: config.logs.clone(),
            players: RwLock::new(Arc::from(Vec::new())),
            world: RwLock::new(None),
        }
    }

    /// The player list of the last completed pass.
    pub fn players(&self) -> Arc<[PlayerRecord]> {
        Arc::clone(&self.players.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The last world snapshot read, if any.
    pub fn world(&self) -> Option<Arc<WorldSnapshot>> {
        self.world
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn pass(&self) -> Result<PassReport> {
        self.pass_at(Timestamp::now()).await
    }

    /// One ingestion pass, evaluating time-dependent flags against `now`.
    pub async fn pass_at(&self, now: Timestamp) -> Result<PassReport> {
        let mut report = PassReport::default();

        let quarantine = match self.read_world(now).await {
            Some(snapshot) => {
                report.world_read = true;
                let quarantine = snapshot.quarantine.clone();
                *self.world.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&snapshot));
                self.bus.publish(&Event::WorldRead(snapshot));
                quarantine
            }
            None => Vec::new(),
        };

        let saves = self
            .cache
            .fetch_all(&self.server.player_data_dir(), "dat")
            .await?;
        report.unreachable = saves.failed;
        let stats = self.read_stats().await;

        let records = self
            .project_all(&saves.files, &stats, &quarantine, now, &mut report)
            .await;
        let players: Arc<[PlayerRecord]> = Arc::from(records);

        *self.players.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&players);
        self.bus.publish(&Event::PlayersRead(players));

        tracing::info!(
            players = report.total(),
            retained = report.retained,
            skipped = report.skipped,
            failed = report.failures.len(),
            unreachable = report.unreachable.len(),
            "Ingestion pass complete"
        );
        Ok(report)
    }

    async fn project_all(
        &self,
        files: &[CachedFile],
        stats: &HashMap<String, serde_json::Value>,
        quarantine: &[QuarantineEntry],
        now: Timestamp,
        report: &mut PassReport,
    ) -> Vec<PlayerRecord> {
        let ctx = ProjectionContext {
            catalog: &self.catalog,
            quarantine,
            quarantine_window: self.ingest.quarantine(),
            inactive_after: self.ingest.inactive_after(),
            now,
        };

        let mut records = Vec::with_capacity(files.len());
        let mut inspected = HashSet::new();

        for file in files {
            if let Ok(uuid) = file.stem().parse::<Uuid>() {
                inspected.insert(uuid);
            }
            match projection::project(file, stats.get(file.stem()), &ctx, &self.resolver).await {
                Ok(Some(record)) => {
                    inspected.insert(record.uuid);
                    records.push(record);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(path = %file.remote_path, error = %e, "Skipping player");
                    report.failures.push(PassFailure {
                        path: file.remote_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.projected = records.len();

        let grace = self.ingest.grace();
        let previous = self.players();
        for old in previous.iter() {
            if !inspected.contains(&old.uuid) && within(now, old.last_seen, grace) {
                tracing::debug!(uuid = %old.uuid, name = %old.name, "Retaining unreachable player");
                records.push(old.clone());
                report.retained += 1;
            }
        }

        records
    }

    async fn read_world(&self, now: Timestamp) -> Option<Arc<WorldSnapshot>> {
        let path = self.server.world_data_file();
        let file = match self.cache.fetch(&path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "World save unavailable");
                return None;
            }
        };
        let tree = match nbt::parse(&file.bytes) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "World save undecodable");
                return None;
            }
        };
        Some(Arc::new(world::snapshot(&tree, &self.resolver, now).await))
    }

    /// Stats blobs keyed by file stem (the player's UUID).
    async fn read_stats(&self) -> HashMap<String, serde_json::Value> {
        let dir = self.server.stats_dir();
        let bulk = match self.cache.fetch_all(&dir, "json").await {
            Ok(bulk) => bulk,
            Err(e) => {
                tracing::warn!(dir = %dir, error = %e, "Stats unavailable");
                return HashMap::new();
            }
        };

        bulk.files
            .iter()
            .filter_map(|file| match serde_json::from_slice(&file.bytes) {
                Ok(value) => Some((file.stem().to_string(), value)),
                Err(e) => {
                    tracing::warn!(path = %file.remote_path, error = %e, "Ignoring malformed stats");
                    None
                }
            })
            .collect()
    }

    // ── Logs ──

    /// Fetch `latest.log` and the rotated `.log.gz` files, newest first,
    /// and publish them.
    pub async fn read_logs(&self) -> Result<Arc<[LogFile]>> {
        let dir = &self.server.logs;
        let mut logs = Vec::new();

        match self.cache.fetch(&join(dir, "latest.log")).await {
            Ok(file) => logs.push(log_file(0, "latest.log", String::new(), &file.bytes)),
            Err(RemoteError::NotFound(_)) => {}
            Err(e) => tracing::warn!(error = %e, "latest.log unavailable"),
        }

        let rotated = self.cache.fetch_all(dir, "gz").await?;
        for file in &rotated.files {
            let name = file.remote_path.rsplit('/').next().unwrap_or_default();
            let Some((date, index)) = parse_log_name(name) else {
                continue;
            };
            let mut text = Vec::new();
            if let Err(e) = GzDecoder::new(file.bytes.as_slice()).read_to_end(&mut text) {
                tracing::warn!(path = %file.remote_path, error = %e, "Skipping corrupt log");
                continue;
            }
            logs.push(log_file(index, name, date, &text));
        }

        logs.sort_by(|a, b| {
            (a.date.is_empty(), &a.date, a.index)
                .cmp(&(b.date.is_empty(), &b.date, b.index))
                .reverse()
        });

        let logs: Arc<[LogFile]> = Arc::from(logs);
        self.bus.publish(&Event::LogsRead(Arc::clone(&logs)));
        tracing::info!(files = logs.len(), "Logs read");
        Ok(logs)
    }

    // ── Scheduling ──

    /// Run ingestion (and log retrieval, when enabled) until `cancel` fires.
    ///
    /// Each task waits for its own previous run before starting the next;
    /// the two tasks interleave freely. Cancellation also abandons a run in
    /// flight; cached files are only ever replaced by rename.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::join!(self.ingest_loop(&cancel), self.logs_loop(&cancel));
    }

    async fn ingest_loop(&self, cancel: &CancellationToken) {
        let period = self.ingest.interval();
        tracing::info!(interval_secs = period.as_secs(), "Ingestion started");

        let mut interval = ticker(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Ingestion stopping");
                    break;
                }
                _ = interval.tick() => {}
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Ingestion stopping mid-pass");
                    break;
                }
                result = self.pass() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Ingestion pass failed");
                    }
                }
            }
        }
    }

    async fn logs_loop(&self, cancel: &CancellationToken) {
        if !self.logs.enabled {
            tracing::debug!("Log retrieval disabled");
            return;
        }
        let period = self.logs.interval();
        tracing::info!(interval_secs = period.as_secs(), "Log retrieval started");

        let mut interval = ticker(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Log retrieval stopping");
                    break;
                }
                _ = interval.tick() => {}
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Log retrieval stopping mid-read");
                    break;
                }
                result = self.read_logs() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Log retrieval failed");
                    }
                }
            }
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

fn within(now: Timestamp, then: Timestamp, window: SignedDuration) -> bool {
    now.duration_since(then) <= window
}

/// `2024-01-05-3.log.gz` → (`2024-01-05`, 3).
fn parse_log_name(name: &str) -> Option<(String, u32)> {
    let stem = name.strip_suffix(".log.gz")?;
    let (date, index) = stem.rsplit_once('-')?;
    Some((date.to_string(), index.parse().ok()?))
}

fn log_file(index: u32, name: &str, date: String, bytes: &[u8]) -> LogFile {
    LogFile {
        index,
        name: name.to_string(),
        date,
        lines: String::from_utf8_lossy(bytes)
            .lines()
            .map(str::to_string)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::sync::Mutex;

    use fastnbt::Value;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    use crate::events::Subscriber;
    use crate::identity::fake::FakeProfiles;
    use crate::model::{DevilFruit, Rarity};
    use crate::remote::fake::FakeStore;
    use crate::storage::Storage;

    const T0: i64 = 1_750_000_000;

    fn ts(second: i64) -> Timestamp {
        Timestamp::from_second(second).unwrap()
    }

    fn days(n: i64) -> SignedDuration {
        SignedDuration::from_hours(24 * n)
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn compound(entries: Vec<(&str, Value)>) -> Value {
        Value::Compound(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn player_save(fruit: &str, with_haki: bool) -> Vec<u8> {
        let mut caps = vec![
            (
                "mineminenomi:entity_stats",
                compound(vec![
                    ("faction", Value::String("marine".into())),
                    ("doriki", Value::Int(100)),
                    ("belly", Value::Long(50)),
                    ("bounty", Value::Long(0)),
                    ("loyalty", Value::Int(1)),
                ]),
            ),
            (
                "mineminenomi:devil_fruit",
                compound(vec![("devilFruit", Value::String(fruit.into()))]),
            ),
            ("mineminenomi:ability_data", compound(vec![])),
        ];
        if with_haki {
            caps.push((
                "mineminenomi:haki_data",
                compound(vec![
                    ("busoshokuHardeningHakiExp", Value::Float(1.0)),
                    ("busoshokuImbuingHakiExp", Value::Float(1.0)),
                    ("kenbunshokuHakiExp", Value::Float(1.0)),
                ]),
            ));
        }
        let root = compound(vec![("ForgeCaps", compound(caps))]);
        gzip(&fastnbt::to_bytes(&root).unwrap())
    }

    fn world_save(quarantined: Uuid, logged_out_ms: i64) -> Vec<u8> {
        let root = compound(vec![(
            "data",
            compound(vec![
                ("issuedBounties", compound(vec![])),
                ("crews", Value::List(vec![])),
                (
                    "devilFruitsInInventories",
                    Value::List(vec![compound(vec![
                        ("uuid", Value::String(quarantined.to_string())),
                        ("date", Value::Long(logged_out_ms)),
                        ("fruits", Value::Int(0)),
                    ])]),
                ),
            ]),
        )]);
        gzip(&fastnbt::to_bytes(&root).unwrap())
    }

    fn uuid(n: u64) -> Uuid {
        Uuid::from_u64_pair(0, n)
    }

    fn save_path(n: u64) -> String {
        format!("world/playerdata/{}.dat", uuid(n))
    }

    struct Recorder(Mutex<Vec<&'static str>>);

    impl Subscriber for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handle(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind());
        }
    }

    struct Harness {
        _dir: TempDir,
        store: Arc<FakeStore>,
        profiles: Arc<FakeProfiles>,
        events: Arc<Recorder>,
        pipeline: Pipeline,
    }

    fn harness(players: u64) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let profiles = Arc::new(FakeProfiles::default());
        for n in 1..=players {
            store.put(&save_path(n), player_save("mera_mera", true), ts(T0));
            profiles.set_name(uuid(n), &format!("player{n}"));
        }

        let storage = Arc::new(Storage::new(dir.path().join("mirror.sqlite")).unwrap());
        let resolver = Arc::new(IdentityResolver::new(
            storage,
            profiles.clone(),
            SignedDuration::from_hours(24),
            None,
        ));
        let catalog = Arc::new(
            Catalog::new(vec![DevilFruit {
                qualified_name: "mera_mera".into(),
                name: "mera_mera_no_mi".into(),
                format_name: "Mera Mera no Mi".into(),
                rarity: Rarity::IronBox,
            }])
            .unwrap(),
        );

        let events = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut bus = EventBus::new();
        bus.subscribe(events.clone());

        let config = Config::parse(
            "[ftp]\nhost = \"localhost\"\nusername = \"u\"\npassword = \"p\"\n\n[logs]\nenabled = true\n",
        )
        .unwrap();
        let cache = FileCache::new(store.clone(), dir.path().join("cache"));
        let pipeline = Pipeline::new(cache, catalog, resolver, bus, &config);

        Harness {
            _dir: dir,
            store,
            profiles,
            events,
            pipeline,
        }
    }

    fn names(players: &[PlayerRecord]) -> Vec<String> {
        let mut names: Vec<String> = players.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn one_malformed_save_does_not_block_the_rest() {
        let h = harness(5);
        h.store.put(&save_path(3), player_save("mera_mera", false), ts(T0));

        let report = h.pipeline.pass_at(ts(T0)).await.unwrap();

        assert_eq!(report.projected, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, save_path(3));
        assert!(report.failures[0].error.contains("haki_data"));
        assert_eq!(h.pipeline.players().len(), 4);
    }

    #[tokio::test]
    async fn pass_publishes_the_swapped_list() {
        let h = harness(2);

        h.pipeline.pass_at(ts(T0)).await.unwrap();

        assert_eq!(
            names(&h.pipeline.players()),
            ["player1", "player2"]
        );
        // No world save: only the player list is published.
        assert_eq!(*h.events.0.lock().unwrap(), ["players_read"]);
    }

    #[tokio::test]
    async fn unreachable_player_is_retained_within_grace() {
        let h = harness(2);
        h.pipeline.pass_at(ts(T0)).await.unwrap();

        h.store.remove(&save_path(2));
        let now = ts(T0).checked_add(days(4)).unwrap();
        let report = h.pipeline.pass_at(now).await.unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(names(&h.pipeline.players()), ["player1", "player2"]);

        let later = ts(T0).checked_add(days(6)).unwrap();
        let report = h.pipeline.pass_at(later).await.unwrap();
        assert_eq!(report.retained, 0);
        assert_eq!(names(&h.pipeline.players()), ["player1"]);
    }

    #[tokio::test]
    async fn failed_download_counts_as_unreachable() {
        let h = harness(2);
        h.pipeline.pass_at(ts(T0)).await.unwrap();

        h.store.put(&save_path(2), player_save("mera_mera", true), ts(T0 + 60));
        h.store.break_file(&save_path(2));
        let report = h.pipeline.pass_at(ts(T0 + 120)).await.unwrap();

        assert_eq!(report.unreachable, [save_path(2)]);
        assert_eq!(report.retained, 1);
        assert_eq!(h.pipeline.players().len(), 2);
    }

    #[tokio::test]
    async fn inspected_but_broken_player_is_dropped() {
        let h = harness(2);
        h.pipeline.pass_at(ts(T0)).await.unwrap();

        h.store.put(&save_path(2), player_save("mera_mera", false), ts(T0 + 60));
        let report = h.pipeline.pass_at(ts(T0 + 120)).await.unwrap();

        assert_eq!(report.retained, 0);
        assert_eq!(names(&h.pipeline.players()), ["player1"]);
    }

    #[tokio::test]
    async fn world_quarantine_reaches_projection() {
        let h = harness(2);
        h.store.put(
            "world/data/mineminenomi.dat",
            world_save(uuid(1), (T0 - 3600) * 1000),
            ts(T0),
        );

        let report = h.pipeline.pass_at(ts(T0)).await.unwrap();
        assert!(report.world_read);

        let players = h.pipeline.players();
        let p1 = players.iter().find(|p| p.uuid == uuid(1)).unwrap();
        let p2 = players.iter().find(|p| p.uuid == uuid(2)).unwrap();
        assert!(p1.devil_fruits.is_empty());
        assert_eq!(p2.devil_fruits.len(), 1);
        assert_eq!(h.pipeline.world().unwrap().read_at, ts(T0));
        assert_eq!(*h.events.0.lock().unwrap(), ["world_read", "players_read"]);
    }

    #[tokio::test]
    async fn logs_are_gunzipped_and_ordered_newest_first() {
        let h = harness(0);
        h.store.put("logs/latest.log", b"[12:00] Luffy joined".to_vec(), ts(T0));
        h.store.put("logs/2025-06-14-1.log.gz", gzip(b"a\nb"), ts(T0));
        h.store.put("logs/2025-06-15-2.log.gz", gzip(b"c"), ts(T0));
        h.store.put("logs/2025-06-15-1.log.gz", gzip(b"d"), ts(T0));

        let logs = h.pipeline.read_logs().await.unwrap();

        let order: Vec<&str> = logs.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            order,
            [
                "latest.log",
                "2025-06-15-2.log.gz",
                "2025-06-15-1.log.gz",
                "2025-06-14-1.log.gz"
            ]
        );
        assert_eq!(logs[3].lines, ["a", "b"]);
        assert_eq!(*h.events.0.lock().unwrap(), ["logs_read"]);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let h = harness(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), h.pipeline.run(cancel))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_abandons_a_pass_in_flight() {
        let h = harness(1);
        h.profiles.set_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), h.pipeline.run(cancel))
            .await
            .unwrap();

        assert_eq!(h.profiles.calls(), 1);
        assert!(h.pipeline.players().is_empty());
    }

    #[test]
    fn log_names_parse() {
        assert_eq!(
            parse_log_name("2024-01-05-3.log.gz"),
            Some(("2024-01-05".to_string(), 3))
        );
        assert_eq!(parse_log_name("latest.log"), None);
        assert_eq!(parse_log_name("debug.log.gz"), None);
    }
}
