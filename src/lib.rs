//! A streaming reader for TAR archives.
//!
//! This library decodes POSIX ustar tape archives together with the GNU
//! and PAX extensions that have grown around the format: long name and
//! long link records, PAX extended headers (path and size overrides,
//! extended attributes, POSIX ACLs), and the GNU sparse formats 0.0, 0.1
//! and 1.0. Sparse members are surfaced transparently: their data handle
//! presents the logical file, with hole bytes re-synthesized as zeros.
//!
//! The archive is abstracted over any [`Read`](std::io::Read)
//! implementation and consumed strictly once, front to back; an archive is
//! never required to be fully resident in memory, which keeps
//! multi-gigabyte archives readable under a bounded memory budget. Members
//! are yielded lazily by an iterator, and the payload of a member the
//! caller does not read is accounted for and skipped automatically.
//!
//! ```no_run
//! use std::fs::File;
//! use streamtar::Archive;
//!
//! fn main() -> streamtar::Result<()> {
//!     let mut ar = Archive::new(File::open("backup.tar")?);
//!     for entry in ar.entries()? {
//!         let entry = entry?;
//!         println!(
//!             "{} ({} bytes)",
//!             String::from_utf8_lossy(&entry.path_bytes()),
//!             entry.size(),
//!         );
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Out of scope by design: writing archives, extracting members to the
//! filesystem, compression codecs, and multi-volume archives. Those
//! concerns live in front of or behind the byte stream this crate reads.

#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

pub use crate::acl::{AclEntry, AclTag};
pub use crate::archive::{Archive, Entries};
pub use crate::entry::Entry;
pub use crate::entry_type::EntryType;
pub use crate::error::{Error, Result};
pub use crate::header::{
    GnuExtSparseHeader, GnuHeader, GnuSparseHeader, Header, OldHeader, UstarHeader, BLOCK_SIZE,
};
pub use crate::pax::{PaxExtension, PaxExtensions};
pub use crate::sparse::{SparseEntry, SparseMap};

mod acl;
mod archive;
mod entry;
mod entry_type;
mod error;
mod header;
mod pax;
mod sparse;
