//! csvdrop File Storage
//!
//! This crate provides the storage layer for the csvdrop service: CSV files
//! uploaded over HTTP are persisted on disk, bucketed by calendar date, and
//! read back later by listing or download requests.
//!
//! ## Storage Layout
//!
//! All files live under a single storage root, with one directory level per
//! date component:
//!
//! ```text
//! <storage_root>/
//! └── 2024/            # year
//!     └── 03/          # zero-padded month
//!         └── 05/      # zero-padded day
//!             └── report.csv
//! ```
//!
//! ## Design Principles
//!
//! - The directory tree is the only index: every listing operation re-derives
//!   its answer by walking the filesystem at request time, so there is no
//!   cache to keep consistent.
//! - Uploads overwrite silently: a second upload of the same filename on the
//!   same date replaces the previous bytes. Writes are not atomic.
//! - Directory names that do not form a valid calendar date are skipped
//!   during the date walk, never surfaced as errors.
//! - Filenames are validated against directory traversal: a name containing a
//!   path separator or a `..` component is rejected, not sanitised.
//!
//! ## Example Usage
//!
//! ```no_run
//! use csvdrop_core::{FileStore, StoreConfig};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::new(PathBuf::from("files"));
//! let store = FileStore::new(&config)?;
//!
//! let date = csvdrop_core::parse_date("2024-03-05")?;
//! store.save(date, "report.csv", b"a,b\n1,2\n")?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use store::{parse_date, FileStore};
