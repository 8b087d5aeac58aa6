//! Relational normalizer
//!
//! Turns the four scraped tables (events, fights, fight stats, fighters)
//! into one schema linked by integer keys:
//!
//! 1. every row gets a surrogate primary key ([`keys::assign_keys`]);
//! 2. fighter full names become the join key for fighter references;
//! 3. references by display name, URL or full name are replaced by keys,
//!    and rows whose references cannot be resolved are rejected;
//! 4. the tables are written with fixed column orders, primary key first.
//!
//! The transformation is driven by which typed fields are already
//! populated, so running it over its own output changes nothing.
//!
//! Rejected rows are not lost: they are parked as raw rows in a
//! `<table>_rejected.csv` sibling of each output table and read back on
//! the next pass, where they are accepted once their references resolve.

mod foreign;
mod keys;
mod rows;

pub use foreign::{Lookup, UnresolvedRef};
pub use keys::{assign_keys, repeated_keys, KeyAssignment};
pub use rows::{
    EntityRef, Event, Fight, FightStat, Fighter, RawEvent, RawFight, RawFightStat, RawFighter,
    EVENT_COLUMNS, FIGHTER_COLUMNS, FIGHT_COLUMNS, FIGHT_STAT_COLUMNS, RAW_FIGHTER_COLUMNS,
};

use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, PathsConfig};
use crate::state::RunSummary;
use crate::storage::{self, KeyRegistry, StagedFile, StorageError, StorageResult};
use crate::{Result, ScrapeError};

/// The four tables of the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Events,
    Fights,
    FightStats,
    Fighters,
}

impl TableName {
    pub const ALL: [TableName; 4] = [
        TableName::Events,
        TableName::Fights,
        TableName::FightStats,
        TableName::Fighters,
    ];

    /// File name of the table, raw and normalized alike
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Events => "ufc_event_data.csv",
            Self::Fights => "ufc_fight_data.csv",
            Self::FightStats => "ufc_fight_stat_data.csv",
            Self::Fighters => "ufc_fighter_data.csv",
        }
    }

    /// Name the table's keys are filed under in the key registry
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Fights => "fights",
            Self::FightStats => "fight_stats",
            Self::Fighters => "fighters",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Events => "event_id",
            Self::Fights => "fight_id",
            Self::FightStats => "fight_stat_id",
            Self::Fighters => "fighter_id",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry contents: natural key -> surrogate key, per table
pub type KnownKeys = HashMap<TableName, HashMap<String, i64>>;

/// The four tables as read from disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTables {
    pub events: Vec<RawEvent>,
    pub fights: Vec<RawFight>,
    pub fight_stats: Vec<RawFightStat>,
    pub fighters: Vec<RawFighter>,
}

impl RawTables {
    pub fn row_count(&self, table: TableName) -> usize {
        match table {
            TableName::Events => self.events.len(),
            TableName::Fights => self.fights.len(),
            TableName::FightStats => self.fight_stats.len(),
            TableName::Fighters => self.fighters.len(),
        }
    }
}

/// The four tables with keys assigned and references resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTables {
    pub events: Vec<Event>,
    pub fights: Vec<Fight>,
    pub fight_stats: Vec<FightStat>,
    pub fighters: Vec<Fighter>,
}

impl NormalizedTables {
    pub fn row_count(&self, table: TableName) -> usize {
        match table {
            TableName::Events => self.events.len(),
            TableName::Fights => self.fights.len(),
            TableName::FightStats => self.fight_stats.len(),
            TableName::Fighters => self.fighters.len(),
        }
    }
}

/// Why a row was left out of the normalized tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The row's primary key is already held by an earlier row
    DuplicateKey { column: &'static str, key: i64 },
    Unresolved(UnresolvedRef),
}

impl From<UnresolvedRef> for RejectReason {
    fn from(reason: UnresolvedRef) -> Self {
        Self::Unresolved(reason)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { column, key } => {
                write!(f, "{} {} already belongs to an earlier row", column, key)
            }
            Self::Unresolved(reason) => write!(f, "{}", reason),
        }
    }
}

/// Output of [`normalize`]
#[derive(Debug)]
pub struct Normalization {
    pub tables: NormalizedTables,
    /// The raw rows left out of `tables`, unchanged
    pub rejected: RawTables,
    /// (natural key, surrogate key) of every written row, per table
    pub keys: Vec<(TableName, Vec<(String, i64)>)>,
    /// Number of keys handed out for the first time
    pub fresh_keys: usize,
    /// One `Done` per table, one `Skipped` per rejected row
    pub summary: RunSummary,
}

/// Normalizes the four tables
///
/// Pure apart from logging: reads nothing, writes nothing.
pub fn normalize(raw: RawTables, known: &KnownKeys) -> Normalization {
    let mut summary = RunSummary::new("normalize");
    let mut rejected = RawTables::default();
    let mut registry_keys = Vec::new();
    let mut fresh_keys = 0;

    let no_keys = HashMap::new();
    let known_for = |table: TableName| known.get(&table).unwrap_or(&no_keys);

    // A key may belong to one row only; later holders are rejected before
    // anything resolves against them.
    let events_in = split_repeated_keys(
        raw.events,
        |e| e.event_id,
        TableName::Events,
        &mut summary,
        &mut rejected.events,
    );
    let fighters_in = split_repeated_keys(
        raw.fighters,
        |f| f.fighter_id,
        TableName::Fighters,
        &mut summary,
        &mut rejected.fighters,
    );
    let fights_in = split_repeated_keys(
        raw.fights,
        |f| f.fight_id,
        TableName::Fights,
        &mut summary,
        &mut rejected.fights,
    );
    let stats_in = split_repeated_keys(
        raw.fight_stats,
        |s| s.fight_stat_id,
        TableName::FightStats,
        &mut summary,
        &mut rejected.fight_stats,
    );

    // Events and fighters reference nothing: every remaining row is accepted.
    let event_natural: Vec<String> = events_in.iter().map(|(_, e)| e.event_url.clone()).collect();
    let event_existing: Vec<Option<i64>> = events_in.iter().map(|(_, e)| e.event_id).collect();
    let assigned = assign_keys(&event_existing, &event_natural, known_for(TableName::Events));
    fresh_keys += assigned.fresh;

    let events: Vec<Event> = events_in
        .into_iter()
        .zip(&assigned.keys)
        .map(|((_, raw), &event_id)| Event {
            event_id,
            event_name: raw.event_name,
            event_date: raw.event_date,
            event_city: raw.event_city,
            event_state: raw.event_state,
            event_country: raw.event_country,
            event_url: raw.event_url,
        })
        .collect();
    registry_keys.push((TableName::Events, zip_keys(event_natural, &assigned.keys)));

    let fighter_natural: Vec<String> = fighters_in
        .iter()
        .map(|(_, f)| f.fighter_url.clone())
        .collect();
    let fighter_existing: Vec<Option<i64>> =
        fighters_in.iter().map(|(_, f)| f.fighter_id).collect();
    let assigned = assign_keys(
        &fighter_existing,
        &fighter_natural,
        known_for(TableName::Fighters),
    );
    fresh_keys += assigned.fresh;

    let fighters: Vec<Fighter> = fighters_in
        .into_iter()
        .zip(&assigned.keys)
        .map(|((_, raw), &fighter_id)| Fighter {
            fighter_id,
            fighter_name: raw.full_name(),
            fighter_nickname: raw.fighter_nickname,
            fighter_height_cm: raw.fighter_height_cm,
            fighter_weight_lbs: raw.fighter_weight_lbs,
            fighter_reach_cm: raw.fighter_reach_cm,
            fighter_stance: raw.fighter_stance,
            fighter_dob: raw.fighter_dob,
            fighter_w: raw.fighter_w,
            fighter_l: raw.fighter_l,
            fighter_d: raw.fighter_d,
            fighter_nc_dq: raw.fighter_nc_dq,
            fighter_url: raw.fighter_url,
        })
        .collect();
    registry_keys.push((TableName::Fighters, zip_keys(fighter_natural, &assigned.keys)));

    let event_lookup = Lookup::build(
        TableName::Events.as_str(),
        events.iter().map(|e| (e.event_name.clone(), e.event_id)),
    );
    let fighter_lookup = Lookup::build(
        TableName::Fighters.as_str(),
        fighters.iter().map(|f| (f.fighter_name.clone(), f.fighter_id)),
    );

    // Fights: resolve references first so keys go to accepted rows only.
    let mut accepted = Vec::with_capacity(fights_in.len());
    for (index, fight) in fights_in {
        match resolve_fight(&fight, &event_lookup, &fighter_lookup) {
            Ok(refs) => accepted.push((fight, refs)),
            Err(reason) => {
                reject(&mut summary, TableName::Fights, index, reason.into());
                rejected.fights.push(fight);
            }
        }
    }

    let fight_natural: Vec<String> = accepted.iter().map(|(f, _)| f.fight_url.clone()).collect();
    let fight_existing: Vec<Option<i64>> = accepted.iter().map(|(f, _)| f.fight_id).collect();
    let assigned = assign_keys(&fight_existing, &fight_natural, known_for(TableName::Fights));
    fresh_keys += assigned.fresh;

    let fights: Vec<Fight> = accepted
        .into_iter()
        .zip(&assigned.keys)
        .map(|((raw, refs), &fight_id)| Fight {
            fight_id,
            event_id: refs.event_id,
            referee: raw.referee,
            f_1: refs.f_1,
            f_2: refs.f_2,
            winner: refs.winner,
            num_rounds: raw.num_rounds,
            title_fight: raw.title_fight,
            weight_class: raw.weight_class,
            gender: raw.gender,
            result: raw.result,
            result_details: raw.result_details,
            finish_round: raw.finish_round,
            finish_time: raw.finish_time,
            fight_url: raw.fight_url,
        })
        .collect();
    registry_keys.push((TableName::Fights, zip_keys(fight_natural, &assigned.keys)));

    let fight_lookup = Lookup::build(
        TableName::Fights.as_str(),
        fights.iter().map(|f| (f.fight_url.clone(), f.fight_id)),
    );

    // Fight stats: the natural key is the fight URL plus the row's position
    // among that fight's rows.
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    let mut accepted = Vec::with_capacity(stats_in.len());
    for (index, stat) in stats_in {
        let ordinal = ordinals.entry(stat.fight_url.clone()).or_insert(0);
        *ordinal += 1;
        let natural = format!("{}#{}", stat.fight_url, ordinal);

        match resolve_fight_stat(&stat, &fight_lookup, &fighter_lookup) {
            Ok(refs) => accepted.push((stat, refs, natural)),
            Err(reason) => {
                reject(&mut summary, TableName::FightStats, index, reason.into());
                rejected.fight_stats.push(stat);
            }
        }
    }

    let stat_existing: Vec<Option<i64>> = accepted.iter().map(|(s, _, _)| s.fight_stat_id).collect();
    let stat_natural: Vec<String> = accepted.iter().map(|(_, _, n)| n.clone()).collect();
    let assigned = assign_keys(&stat_existing, &stat_natural, known_for(TableName::FightStats));
    fresh_keys += assigned.fresh;

    let fight_stats: Vec<FightStat> = accepted
        .into_iter()
        .zip(&assigned.keys)
        .map(|((raw, (fight_id, fighter_id), _), &fight_stat_id)| FightStat {
            fight_stat_id,
            fight_id,
            fighter_id,
            knockdowns: raw.knockdowns,
            total_strikes_att: raw.total_strikes_att,
            total_strikes_succ: raw.total_strikes_succ,
            sig_strikes_att: raw.sig_strikes_att,
            sig_strikes_succ: raw.sig_strikes_succ,
            takedown_att: raw.takedown_att,
            takedown_succ: raw.takedown_succ,
            submission_att: raw.submission_att,
            reversals: raw.reversals,
            ctrl_time: raw.ctrl_time,
            fight_url: raw.fight_url,
        })
        .collect();
    registry_keys.push((TableName::FightStats, zip_keys(stat_natural, &assigned.keys)));

    let tables = NormalizedTables {
        events,
        fights,
        fight_stats,
        fighters,
    };
    for table in TableName::ALL {
        summary.record_done(table.as_str(), tables.row_count(table));
    }

    Normalization {
        tables,
        rejected,
        keys: registry_keys,
        fresh_keys,
        summary,
    }
}

#[derive(Debug)]
struct FightRefs {
    event_id: i64,
    f_1: i64,
    f_2: i64,
    winner: Option<i64>,
}

fn resolve_fight(
    fight: &RawFight,
    events: &Lookup,
    fighters: &Lookup,
) -> std::result::Result<FightRefs, UnresolvedRef> {
    Ok(FightRefs {
        event_id: events.resolve("event_id", &fight.event_id)?,
        f_1: fighters.resolve("f_1", &fight.f_1)?,
        f_2: fighters.resolve("f_2", &fight.f_2)?,
        winner: fighters.resolve_optional("winner", &fight.winner)?,
    })
}

/// Returns (fight key, fighter key)
fn resolve_fight_stat(
    stat: &RawFightStat,
    fights: &Lookup,
    fighters: &Lookup,
) -> std::result::Result<(i64, i64), UnresolvedRef> {
    let fight_id = match stat.fight_id {
        Some(key) if fights.contains_key(key) => key,
        Some(key) => return Err(UnresolvedRef::UnknownKey { column: "fight_id", key }),
        None => fights
            .get(&stat.fight_url)
            .ok_or_else(|| UnresolvedRef::UnknownName {
                column: "fight_id",
                name: stat.fight_url.clone(),
            })?,
    };
    let fighter_id = fighters.resolve("fighter_id", &stat.fighter_id)?;
    Ok((fight_id, fighter_id))
}

/// Moves the rows whose key repeats an earlier row's into `parked` and
/// returns the rest, each with its row index
fn split_repeated_keys<T>(
    rows: Vec<T>,
    key_of: impl Fn(&T) -> Option<i64>,
    table: TableName,
    summary: &mut RunSummary,
    parked: &mut Vec<T>,
) -> Vec<(usize, T)> {
    let existing: Vec<Option<i64>> = rows.iter().map(&key_of).collect();
    let repeated = repeated_keys(&existing);

    let mut kept = Vec::with_capacity(rows.len());
    for (index, ((row, key), repeated)) in rows
        .into_iter()
        .zip(existing)
        .zip(repeated)
        .enumerate()
    {
        match key {
            Some(key) if repeated => {
                let column = table.key_column();
                reject(summary, table, index, RejectReason::DuplicateKey { column, key });
                parked.push(row);
            }
            _ => kept.push((index, row)),
        }
    }
    kept
}

fn reject(summary: &mut RunSummary, table: TableName, index: usize, reason: RejectReason) {
    summary.record_skip(format!("{} row {}", table, index + 1), reason);
}

/// Pairs natural keys with their assigned keys, dropping empty natural keys
fn zip_keys(natural: Vec<String>, keys: &[i64]) -> Vec<(String, i64)> {
    natural
        .into_iter()
        .zip(keys.iter().copied())
        .filter(|(natural, _)| !natural.is_empty() && !natural.starts_with('#'))
        .collect()
}

/// Outcome of a normalization pass
#[derive(Debug)]
pub struct NormalizeReport {
    pub output_dir: PathBuf,
    pub rows: Vec<(TableName, usize)>,
    /// Rows parked for the next pass, per table
    pub parked: Vec<(TableName, usize)>,
    pub fresh_keys: usize,
    pub summary: RunSummary,
}

impl NormalizeReport {
    pub fn rejected(&self) -> usize {
        self.summary.skipped_count()
    }
}

/// Reads the raw tables, normalizes them and writes the result
pub struct Normalizer {
    paths: PathsConfig,
}

impl Normalizer {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.clone())
    }

    pub fn raw_path(&self, table: TableName) -> PathBuf {
        self.paths.raw_dir.join(table.file_name())
    }

    pub fn output_path(&self, table: TableName) -> PathBuf {
        self.paths.normalized_dir.join(table.file_name())
    }

    /// Where the rows of `table` rejected by the last pass are kept
    pub fn parked_path(&self, table: TableName) -> PathBuf {
        storage::rejected_path(&self.output_path(table))
    }

    /// Runs one normalization pass
    ///
    /// Nothing is written unless all four raw tables exist and parse, and
    /// the output files replace the previous ones only once all four have
    /// been written out.
    pub fn run(&self) -> Result<NormalizeReport> {
        for table in TableName::ALL {
            let path = self.raw_path(table);
            if !path.is_file() {
                tracing::error!("Cannot normalize: {} table not found at {}", table, path.display());
                return Err(ScrapeError::MissingInput { path });
            }
        }

        tracing::info!("Normalizing tables from {}", self.paths.raw_dir.display());
        let mut raw = RawTables {
            events: storage::read_table(&self.raw_path(TableName::Events))?,
            fights: storage::read_table(&self.raw_path(TableName::Fights))?,
            fight_stats: storage::read_table(&self.raw_path(TableName::FightStats))?,
            fighters: storage::read_table(&self.raw_path(TableName::Fighters))?,
        };
        self.read_back_parked(&mut raw)?;

        let mut registry = storage::open_key_registry(self.paths.key_registry.as_deref())?;
        let mut known = KnownKeys::new();
        for table in TableName::ALL {
            known.insert(table, registry.load_table(table.as_str())?);
        }

        let normalization = normalize(raw, &known);

        // Uncommitted files remove themselves on every early return below
        let mut staged = self.stage_all(&normalization.tables)?;
        let (parked, stale) = self.stage_parked(&normalization.rejected)?;
        staged.extend(parked);

        save_keys(&mut *registry, &normalization.keys)?;
        for file in staged {
            file.commit()?;
        }
        for path in stale {
            fs::remove_file(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        }

        let rows: Vec<(TableName, usize)> = TableName::ALL
            .iter()
            .map(|&table| (table, normalization.tables.row_count(table)))
            .collect();
        for (table, count) in &rows {
            tracing::info!("{}: {} rows written", table, count);
        }
        let parked: Vec<(TableName, usize)> = TableName::ALL
            .iter()
            .map(|&table| (table, normalization.rejected.row_count(table)))
            .filter(|(_, count)| *count > 0)
            .collect();
        for (table, count) in &parked {
            tracing::info!(
                "{}: {} rejected rows parked in {}",
                table,
                count,
                self.parked_path(*table).display()
            );
        }
        tracing::info!("{} new keys assigned", normalization.fresh_keys);
        normalization.summary.log();

        Ok(NormalizeReport {
            output_dir: self.paths.normalized_dir.clone(),
            rows,
            parked,
            fresh_keys: normalization.fresh_keys,
            summary: normalization.summary,
        })
    }

    /// Appends the rows parked by the previous pass to the raw tables
    ///
    /// Parked files are looked up next to the raw tables, which is where
    /// the previous pass left them when normalizing in place. A parked row
    /// whose natural key the raw table already holds is dropped.
    fn read_back_parked(&self, raw: &mut RawTables) -> StorageResult<()> {
        let parked = |table: TableName| storage::rejected_path(&self.raw_path(table));

        read_back(&parked(TableName::Events), &mut raw.events, |e| {
            e.event_url.clone()
        })?;
        read_back(&parked(TableName::Fighters), &mut raw.fighters, |f| {
            f.fighter_url.clone()
        })?;
        read_back(&parked(TableName::Fights), &mut raw.fights, |f| {
            f.fight_url.clone()
        })?;
        read_back(&parked(TableName::FightStats), &mut raw.fight_stats, |s| {
            format!("{} {:?}", s.fight_url, s.fighter_id)
        })?;
        Ok(())
    }

    /// Stages all four tables
    fn stage_all(&self, tables: &NormalizedTables) -> StorageResult<Vec<StagedFile>> {
        let mut staged = Vec::with_capacity(TableName::ALL.len());
        for table in TableName::ALL {
            let path = self.output_path(table);
            staged.push(match table {
                TableName::Events => storage::stage_table(&path, &EVENT_COLUMNS, &tables.events)?,
                TableName::Fights => storage::stage_table(&path, &FIGHT_COLUMNS, &tables.fights)?,
                TableName::FightStats => {
                    storage::stage_table(&path, &FIGHT_STAT_COLUMNS, &tables.fight_stats)?
                }
                TableName::Fighters => {
                    storage::stage_table(&path, &FIGHTER_COLUMNS, &tables.fighters)?
                }
            });
        }
        Ok(staged)
    }

    /// Stages the parked file of every table with rejected rows, and lists
    /// the parked files left over from earlier passes that are now empty
    fn stage_parked(&self, rejected: &RawTables) -> StorageResult<(Vec<StagedFile>, Vec<PathBuf>)> {
        let mut staged = Vec::new();
        let mut stale = Vec::new();
        for table in TableName::ALL {
            let path = self.parked_path(table);
            if rejected.row_count(table) == 0 {
                if path.is_file() {
                    stale.push(path);
                }
                continue;
            }

            staged.push(match table {
                TableName::Events => storage::stage_table(&path, &EVENT_COLUMNS, &rejected.events)?,
                TableName::Fights => storage::stage_table(&path, &FIGHT_COLUMNS, &rejected.fights)?,
                TableName::FightStats => {
                    storage::stage_table(&path, &FIGHT_STAT_COLUMNS, &rejected.fight_stats)?
                }
                TableName::Fighters => {
                    storage::stage_table(&path, &RAW_FIGHTER_COLUMNS, &rejected.fighters)?
                }
            });
        }
        Ok((staged, stale))
    }
}

/// Appends the rows of the parked file at `path` whose natural key `rows`
/// does not hold yet
fn read_back<T: DeserializeOwned>(
    path: &Path,
    rows: &mut Vec<T>,
    natural: impl Fn(&T) -> String,
) -> StorageResult<()> {
    if !path.is_file() {
        return Ok(());
    }

    let present: HashSet<String> = rows.iter().map(&natural).collect();
    let before = rows.len();
    let parked: Vec<T> = storage::read_table(path)?;
    rows.extend(parked.into_iter().filter(|row| !present.contains(&natural(row))));

    tracing::debug!(
        "{} parked rows read back from {}",
        rows.len() - before,
        path.display()
    );
    Ok(())
}

fn save_keys(
    registry: &mut dyn KeyRegistry,
    keys: &[(TableName, Vec<(String, i64)>)],
) -> StorageResult<()> {
    for (table, pairs) in keys {
        registry.save_table(table.as_str(), pairs)?;
    }
    Ok(())
}
