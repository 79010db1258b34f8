//! Date-bucketed file storage service implementation
//!
//! This module provides the core implementation of csvdrop's storage layer
//! through the [`FileStore`] type. It manages saving uploaded CSV files into
//! per-date directories and reading them back for listing and download.
//!
//! # Storage Layout
//!
//! Every stored file is identified by a `(date, filename)` pair and lives at:
//!
//! ```text
//! <storage_root>/<year>/<MM>/<DD>/<filename>
//! ```
//!
//! with zero-padded month and day components. The tree itself is the index:
//! no metadata is kept beyond what the filesystem provides.
//!
//! # Concurrency
//!
//! The store takes no locks. Bucket creation uses `create_dir_all`, which is
//! idempotent under concurrent callers. Concurrent uploads of the same
//! `(date, filename)` may interleave, and a concurrent download may observe a
//! partially-written file; this matches the service's observed contract.
//!
//! # Security Model
//!
//! Filenames are request-supplied, so both `save` and `read` reject names
//! that contain path separators or a `..` component before touching the
//! filesystem. Rejection (rather than sanitisation) keeps the stored name
//! identical to the requested one.

use crate::{StoreConfig, StoreError, StoreResult};
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// The wire format for dates: ISO-8601 calendar dates (`YYYY-MM-DD`).
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses an ISO date string (`YYYY-MM-DD`) into a calendar date.
///
/// # Errors
///
/// Returns `StoreError::InvalidInput` if the string does not match the
/// format or does not name a valid calendar date (e.g. `2024-13-40`).
pub fn parse_date(input: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_| {
        StoreError::InvalidInput(format!("invalid date format, use YYYY-MM-DD: {input}"))
    })
}

/// Service for storing and retrieving date-bucketed CSV files
///
/// The `FileStore` is bound to a single storage root for its lifetime and is
/// cheap to clone (handlers share it through application state). It is
/// stateless beyond the root path: every operation re-derives its answer from
/// the filesystem.
#[derive(Clone, Debug)]
pub struct FileStore {
    /// Canonicalised storage root containing all date buckets
    root: PathBuf,
}

impl FileStore {
    /// Creates a new `FileStore` rooted at the configured directory.
    ///
    /// The storage root is created if absent (including intermediate
    /// directories) and then canonicalised, so all paths the store hands out
    /// are absolute.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RootDirCreation` if the root cannot be created
    /// or canonicalised.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(config.storage_root()).map_err(StoreError::RootDirCreation)?;
        let root = config
            .storage_root()
            .canonicalize()
            .map_err(StoreError::RootDirCreation)?;
        Ok(Self { root })
    }

    /// Returns the canonicalised storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the bucket directory for a given date: `<root>/YYYY/MM/DD`.
    ///
    /// Pure path arithmetic; the directory may not exist yet.
    pub fn bucket_dir(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(date.year().to_string())
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    /// Saves an uploaded file into the bucket for `date`.
    ///
    /// The extension check runs before any directory is created, so a
    /// rejected upload leaves no trace on disk. An existing file with the
    /// same name is overwritten silently.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` if the filename is unsafe or does
    /// not end in `.csv` (case-sensitive), or an I/O variant if bucket
    /// creation or the write fails.
    pub fn save(&self, date: NaiveDate, filename: &str, bytes: &[u8]) -> StoreResult<PathBuf> {
        validate_filename(filename)?;
        if !filename.ends_with(".csv") {
            return Err(StoreError::InvalidInput(
                "only .csv files are allowed".into(),
            ));
        }

        let bucket = self.bucket_dir(date);
        fs::create_dir_all(&bucket).map_err(StoreError::BucketDirCreation)?;

        let destination = bucket.join(filename);
        fs::write(&destination, bytes).map_err(StoreError::FileWrite)?;

        Ok(destination)
    }

    /// Returns all dates that have at least one stored file, as sorted ISO
    /// date strings.
    ///
    /// Walks the root three directory levels deep (year, month, day). A day
    /// directory counts when it has at least one direct child of any kind.
    /// Directory names that do not parse as integers, or triples that do not
    /// form a valid calendar date, are skipped silently. Zero-padded ISO
    /// strings sort lexicographically in chronological order.
    pub fn list_dates(&self) -> StoreResult<Vec<String>> {
        let mut dates = Vec::new();

        for (year_name, year_dir) in subdirectories(&self.root)? {
            let Ok(year) = year_name.parse::<i32>() else {
                continue;
            };
            for (month_name, month_dir) in subdirectories(&year_dir)? {
                let Ok(month) = month_name.parse::<u32>() else {
                    continue;
                };
                for (day_name, day_dir) in subdirectories(&month_dir)? {
                    let Ok(day) = day_name.parse::<u32>() else {
                        continue;
                    };
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue;
                    };
                    if has_entries(&day_dir)? {
                        dates.push(date.format(DATE_FORMAT).to_string());
                    }
                }
            }
        }

        dates.sort();
        Ok(dates)
    }

    /// Returns the filenames stored in the bucket for `date`.
    ///
    /// A missing bucket yields an empty list, not an error. Subdirectories
    /// are excluded; the order is the filesystem's enumeration order.
    pub fn list_files(&self, date: NaiveDate) -> StoreResult<Vec<String>> {
        let bucket = self.bucket_dir(date);
        if !bucket.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&bucket).map_err(StoreError::DirRead)? {
            let entry = entry.map_err(StoreError::DirRead)?;
            if entry.path().is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(files)
    }

    /// Reads back the bytes of a stored file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` if the filename is unsafe,
    /// `StoreError::FileNotFound` if no file exists at the resolved path,
    /// or `StoreError::FileRead` if the read fails.
    pub fn read(&self, date: NaiveDate, filename: &str) -> StoreResult<Vec<u8>> {
        validate_filename(filename)?;

        let path = self.bucket_dir(date).join(filename);
        if !path.exists() {
            return Err(StoreError::FileNotFound(format!(
                "{}/{}",
                date.format(DATE_FORMAT),
                filename
            )));
        }

        fs::read(&path).map_err(StoreError::FileRead)
    }
}

/// Rejects request-supplied filenames that could escape their bucket.
///
/// A filename must be a single normal path component: no separators, no `..`,
/// not empty. Backslashes are rejected explicitly because on Unix they are
/// ordinary filename characters and would survive the component check.
fn validate_filename(filename: &str) -> StoreResult<()> {
    if filename.contains('\\') {
        return Err(StoreError::InvalidInput(format!(
            "invalid filename: {filename}"
        )));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::InvalidInput(format!(
            "invalid filename: {filename}"
        ))),
    }
}

/// Lists the direct subdirectories of `dir` as `(name, path)` pairs.
///
/// Non-directory entries and names that are not valid UTF-8 are skipped.
fn subdirectories(dir: &Path) -> StoreResult<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(StoreError::DirRead)? {
        let entry = entry.map_err(StoreError::DirRead)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            out.push((name, path));
        }
    }
    Ok(out)
}

/// Shallow check: does the directory contain at least one entry of any kind?
fn has_entries(dir: &Path) -> StoreResult<bool> {
    let mut entries = fs::read_dir(dir).map_err(StoreError::DirRead)?;
    Ok(entries.next().is_some())
}
