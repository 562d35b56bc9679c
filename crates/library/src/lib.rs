//! The conversion core of recast.
//!
//! A [`Session`] holds the source files a user picked, their display names,
//! the artifacts produced from them and the state of the running batch. All
//! mutation goes through its methods:
//!
//! - [`Session::add_files`], [`Session::remove_file`], [`Session::clear_all`]
//!   and [`Session::clear_conversions`] manage the collection.
//! - [`Session::convert_one`] and [`Session::convert_all`] produce artifacts.
//! - [`Session::rename_all`], [`Session::set_custom_name`] and
//!   [`Session::commit_custom_name`] manage names.
//! - [`Session::download`] and [`Session::download_archive`] hand the
//!   converted bytes back out.

pub mod archive;
pub mod convert;
pub mod error;
mod key;
mod models;
mod rename;
mod sanitize;
mod session;

pub use crate::archive::{PackedArchive, SkippedEntry, pack};
pub use crate::convert::BatchOutcome;
pub use crate::key::{FileKey, key_of};
pub use crate::models::{Artifact, BatchState, Download, Progress, Snapshot, SourceFile};
pub use crate::rename::{KeyType, RenameParams};
pub use crate::sanitize::{LAST_RESORT_NAME, sanitize};
pub use crate::session::{Options, Session};
