//! Delimited-record files
//!
//! URL lists are one URL per row without a header. Tables carry a header
//! row and are read and written through serde. Every write goes to a
//! `.tmp` sibling first and is renamed into place by [`StagedFile::commit`],
//! so a reader never observes a half-written file.

use crate::storage::traits::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A fully written temporary file waiting to replace its target
///
/// Dropping a staged file that was never committed removes the temporary
/// file, so an early `?` return leaves no `.tmp` siblings behind.
#[derive(Debug)]
#[must_use = "a staged file is discarded unless committed"]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    fn new(temp: PathBuf, target: &Path) -> Self {
        Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically moves the staged content over the target
    pub fn commit(mut self) -> StorageResult<()> {
        fs::rename(&self.temp, &self.target).map_err(|source| StorageError::Io {
            path: self.target.clone(),
            source,
        })?;
        self.committed = true;
        Ok(())
    }

    /// Removes the temporary file without touching the target
    pub fn discard(self) {}
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Where the rows a normalization pass could not link are parked:
/// `ufc_fight_data.csv` parks into `ufc_fight_data_rejected.csv`
pub fn rejected_path(table: &Path) -> PathBuf {
    let stem = table.file_stem().unwrap_or_default().to_string_lossy();
    let name = match table.extension() {
        Some(ext) => format!("{}_rejected.{}", stem, ext.to_string_lossy()),
        None => format!("{}_rejected", stem),
    };
    table.with_file_name(name)
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> StorageError + '_ {
    move |source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

/// Reads a header-less list with one URL per row
///
/// Blank rows are ignored.
pub fn read_url_list(path: &Path) -> StorageResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error(path))?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        if let Some(url) = record.get(0).map(str::trim).filter(|u| !u.is_empty()) {
            urls.push(url.to_string());
        }
    }

    Ok(urls)
}

/// Writes a URL list to a temporary sibling of `path`
pub fn stage_url_list(path: &Path, urls: &[String]) -> StorageResult<StagedFile> {
    ensure_parent(path)?;
    let temp = temp_path(path);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&temp)
        .map_err(csv_error(&temp))?;

    for url in urls {
        writer.write_record([url]).map_err(csv_error(&temp))?;
    }
    writer.flush().map_err(io_error(&temp))?;

    Ok(StagedFile::new(temp, path))
}

/// Writes a URL list in place of `path`
pub fn write_url_list(path: &Path, urls: &[String]) -> StorageResult<()> {
    stage_url_list(path, urls)?.commit()
}

/// Collects the values of one column of a table
///
/// Returns `Ok(None)` when the table does not exist yet.
pub fn read_column(path: &Path, column: &str) -> StorageResult<Option<HashSet<String>>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| StorageError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut values = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        if let Some(value) = record.get(index).filter(|v| !v.is_empty()) {
            values.insert(value.to_string());
        }
    }

    Ok(Some(values))
}

/// Reads every row of a table with a header row
pub fn read_table<T: DeserializeOwned>(path: &Path) -> StorageResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error(path))
}

/// Writes a table (explicit header, then one row per record) to a
/// temporary sibling of `path`
///
/// `columns` must list the serialized fields of `T` in declaration order.
pub fn stage_table<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[T],
) -> StorageResult<StagedFile> {
    ensure_parent(path)?;
    let temp = temp_path(path);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&temp)
        .map_err(csv_error(&temp))?;

    writer.write_record(columns).map_err(csv_error(&temp))?;
    for row in rows {
        writer.serialize(row).map_err(csv_error(&temp))?;
    }
    writer.flush().map_err(io_error(&temp))?;

    Ok(StagedFile::new(temp, path))
}
