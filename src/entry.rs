use std::borrow::Cow;
use std::cmp;
use std::collections::BTreeMap;
use std::io::prelude::*;
use std::io;
use std::marker;
use std::path::Path;

use crate::acl::AclEntry;
use crate::archive::ArchiveInner;
use crate::entry_type::EntryType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::pax::PaxExtensions;
use crate::sparse::{SparseEntry, SparseMap};
use crate::Archive;

/// A read-only view into one member of an archive.
///
/// An entry carries the member's fully assembled metadata (all GNU and PAX
/// extension records already applied) and a streaming handle over its data
/// in *logical* coordinates: for sparse members, holes read as zeros.
///
/// The data handle is only valid while the archive has not advanced past
/// the member's payload. Once the entry iterator yields the next entry,
/// previously returned entries keep their metadata but must no longer be
/// read from; doing so returns bytes of the wrong member.
pub struct Entry<'a, R: 'a + Read> {
    fields: EntryFields<'a>,
    _ignored: marker::PhantomData<&'a Archive<R>>,
}

// Private implementation detail of `Entry`, but concrete (no type
// parameters) and visible to `archive.rs` which constructs it.
pub(crate) struct EntryFields<'a> {
    pub header: Header,
    pub entry_type: EntryType,
    pub size: u64,
    pub long_pathname: Option<Vec<u8>>,
    pub long_linkname: Option<Vec<u8>>,
    pub pax_path: Option<Vec<u8>>,
    pub pax_extensions: Option<Vec<u8>>,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub acl_access: Vec<AclEntry>,
    pub acl_default: Vec<AclEntry>,
    pub sparse: Option<SparseMap>,
    pub data: EntryData<'a>,
    pub scratch: Vec<u8>,
}

/// The logical byte stream of one member: a bounded physical reader plus,
/// for sparse members, the cursor state that interleaves holes with stored
/// segments.
pub(crate) struct EntryData<'a> {
    physical: PhysicalReader<'a>,
    segments: Option<SparseCursor>,
    pos: u64,
    size: u64,
}

struct SparseCursor {
    segments: Vec<SparseEntry>,
    index: usize,
}

// Serves the leftover bytes of the sparse-1.0 map block before handing
// over to the archive stream proper.
struct PhysicalReader<'a> {
    prefix: Vec<u8>,
    prefix_pos: usize,
    inner: io::Take<&'a ArchiveInner<dyn Read + 'a>>,
}

impl<'a, R: Read> Entry<'a, R> {
    /// Returns the effective path of this member as raw bytes.
    ///
    /// All extension records are applied: a PAX `path` (or
    /// `GNU.sparse.name`) override wins over a GNU long-name record, which
    /// wins over the ustar `prefix`/`name` fields.
    pub fn path_bytes(&self) -> Cow<'_, [u8]> {
        self.fields.path_bytes()
    }

    /// Returns the effective path of this member.
    ///
    /// May fail on non-Unix platforms if the path is not valid unicode.
    pub fn path(&self) -> Result<Cow<'_, Path>> {
        bytes2path(self.fields.path_bytes())
    }

    /// Returns the link target of this member as raw bytes, present iff
    /// the member is a hard or symbolic link.
    ///
    /// A GNU long-link record overrides the ustar field.
    pub fn link_name_bytes(&self) -> Option<Cow<'_, [u8]>> {
        self.fields.link_name_bytes()
    }

    /// Returns the link target of this member, present iff the member is a
    /// hard or symbolic link.
    pub fn link_name(&self) -> Result<Option<Cow<'_, Path>>> {
        match self.fields.link_name_bytes() {
            Some(bytes) => bytes2path(bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the type of this member.
    ///
    /// GNU sparse members (`'S'`) have already been re-typed to regular
    /// files by the time they are yielded.
    pub fn entry_type(&self) -> EntryType {
        self.fields.entry_type
    }

    /// Returns the logical size of this member in bytes.
    ///
    /// For sparse members this is the real file size, not the (smaller)
    /// number of bytes stored in the archive.
    pub fn size(&self) -> u64 {
        self.fields.size
    }

    /// Returns the permission bits of this member (low 12 bits of the
    /// Unix mode).
    pub fn mode(&self) -> Result<u32> {
        self.fields.header.mode()
    }

    /// Returns the numeric owner id of this member.
    pub fn uid(&self) -> Result<u32> {
        self.fields.header.uid()
    }

    /// Returns the numeric group id of this member.
    pub fn gid(&self) -> Result<u32> {
        self.fields.header.gid()
    }

    /// Returns the modification time, in seconds since January 1, 1970.
    pub fn mtime(&self) -> Result<u64> {
        self.fields.header.mtime()
    }

    /// Returns the textual owner name, if the header format carries one.
    pub fn username_bytes(&self) -> Option<&[u8]> {
        self.fields.header.username_bytes()
    }

    /// Returns the textual group name, if the header format carries one.
    pub fn groupname_bytes(&self) -> Option<&[u8]> {
        self.fields.header.groupname_bytes()
    }

    /// Returns the device major number, present iff this member is a
    /// character or block device.
    pub fn device_major(&self) -> Option<Result<u32>> {
        if self.fields.entry_type.is_device() {
            self.fields.header.device_major()
        } else {
            None
        }
    }

    /// Returns the device minor number, present iff this member is a
    /// character or block device.
    pub fn device_minor(&self) -> Option<Result<u32>> {
        if self.fields.entry_type.is_device() {
            self.fields.header.device_minor()
        } else {
            None
        }
    }

    /// Returns the extended attributes of this member, collected from
    /// `SCHILY.xattr.*` and `LIBARCHIVE.xattr.*` PAX records. Possibly
    /// empty.
    pub fn xattrs(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.fields.xattrs
    }

    /// Returns the access ACL of this member, decoded from
    /// `SCHILY.acl.access`. Empty when the archive stored none.
    pub fn acl_access(&self) -> &[AclEntry] {
        &self.fields.acl_access
    }

    /// Returns the default ACL of this member, decoded from
    /// `SCHILY.acl.default`. Empty when the archive stored none.
    pub fn acl_default(&self) -> &[AclEntry] {
        &self.fields.acl_default
    }

    /// Returns the sparse descriptor of this member, if it is stored
    /// sparsely.
    pub fn sparse(&self) -> Option<&SparseMap> {
        self.fields.sparse.as_ref()
    }

    /// Returns an iterator over the raw PAX records that applied to this
    /// member, including keys with no documented effect. `None` when no
    /// extended header preceded it.
    pub fn pax_extensions(&self) -> Option<PaxExtensions<'_>> {
        self.fields
            .pax_extensions
            .as_ref()
            .map(|data| PaxExtensions::new(data))
    }

    /// Returns raw access to the final header record of this member.
    ///
    /// Extension overrides are *not* reflected here; prefer the accessors
    /// on `Entry` itself.
    pub fn header(&self) -> &Header {
        &self.fields.header
    }

    /// Reads `length` logical bytes starting at `offset`.
    ///
    /// The member is streamed, so offsets must not decrease across calls;
    /// a backward `offset` is an invalid-operation error. Skipping forward
    /// over a hole of a sparse member costs no I/O. `length` is clamped to
    /// the end of the member, and the returned slice may be shorter than
    /// requested if the underlying stream runs dry.
    ///
    /// The slice borrows an entry-owned buffer and is invalidated by the
    /// next `read_data` call.
    ///
    /// Only regular (and contiguous) members carry data; calling this on
    /// any other type is an invalid-operation error.
    pub fn read_data(&mut self, offset: u64, length: usize) -> Result<&[u8]> {
        self.fields.read_data(offset, length)
    }

    /// Reads the entire remaining logical content of this member into an
    /// owned buffer.
    ///
    /// Only regular (and contiguous) members carry data; calling this on
    /// any other type is an invalid-operation error.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.fields.read_all()
    }
}

impl<'a, R: Read> Read for Entry<'a, R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        self.fields.data.read(into)
    }
}

impl<'a> EntryFields<'a> {
    pub fn into_entry<R: Read>(self) -> Entry<'a, R> {
        Entry {
            fields: self,
            _ignored: marker::PhantomData,
        }
    }

    fn path_bytes(&self) -> Cow<'_, [u8]> {
        if let Some(ref bytes) = self.pax_path {
            return Cow::Borrowed(bytes);
        }
        match self.long_pathname {
            Some(ref bytes) => Cow::Borrowed(bytes),
            None => self.header.path_bytes(),
        }
    }

    fn link_name_bytes(&self) -> Option<Cow<'_, [u8]>> {
        if !self.entry_type.is_link() {
            return None;
        }
        match self.long_linkname {
            Some(ref bytes) => Some(Cow::Borrowed(bytes)),
            None => self.header.link_name_bytes().map(Cow::Borrowed),
        }
    }

    fn read_data(&mut self, offset: u64, length: usize) -> Result<&[u8]> {
        if !self.entry_type.is_file() {
            return Err(Error::InvalidOperation(
                "entry is not a regular file".to_string(),
            ));
        }
        if offset < self.data.pos {
            return Err(Error::InvalidOperation(format!(
                "cannot seek backwards in streaming mode ({} < {})",
                offset, self.data.pos
            )));
        }
        if offset > self.data.pos {
            self.data.skip_logical(offset - self.data.pos)?;
        }

        let remaining = self.data.size.saturating_sub(offset);
        let want = cmp::min(length as u64, remaining) as usize;
        self.scratch.clear();
        self.scratch.resize(want, 0);
        let mut filled = 0;
        while filled < want {
            match self.data.read(&mut self.scratch[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(&self.scratch[..filled])
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        if !self.entry_type.is_file() {
            return Err(Error::InvalidOperation(
                "entry is not a regular file".to_string(),
            ));
        }
        // Preallocate some data but don't let ourselves get too crazy now.
        let cap = cmp::min(self.data.size - self.data.pos, 128 * 1024);
        let mut v = Vec::with_capacity(cap as usize);
        self.data.read_to_end(&mut v)?;
        Ok(v)
    }
}

impl<'a> EntryData<'a> {
    pub(crate) fn new(
        prefix: Vec<u8>,
        inner: io::Take<&'a ArchiveInner<dyn Read + 'a>>,
        sparse: Option<&SparseMap>,
        size: u64,
    ) -> EntryData<'a> {
        EntryData {
            physical: PhysicalReader {
                prefix,
                prefix_pos: 0,
                inner,
            },
            segments: sparse.map(|map| SparseCursor {
                segments: map.segments().to_vec(),
                index: 0,
            }),
            pos: 0,
            size,
        }
    }

    /// Advances the logical position without surfacing any bytes. Holes
    /// are crossed for free; stored segments are drained from the
    /// underlying stream.
    fn skip_logical(&mut self, mut amt: u64) -> Result<()> {
        match self.segments {
            None => {
                // A short drain means the stream ran dry; the position
                // still advances so later reads come up empty rather than
                // misaligned.
                self.physical.drain(amt)?;
                self.pos += amt;
            }
            Some(ref mut cursor) => {
                while amt > 0 && self.pos < self.size {
                    cursor.skip_empty();
                    let step = match cursor.current() {
                        None => amt,
                        Some(seg) if self.pos < seg.offset => {
                            cmp::min(seg.offset - self.pos, amt)
                        }
                        Some(seg) => {
                            let step = cmp::min(seg.end() - self.pos, amt);
                            self.physical.drain(step)?;
                            step
                        }
                    };
                    self.pos += step;
                    amt -= step;
                    cursor.advance_past(self.pos);
                }
                self.pos += amt;
            }
        }
        Ok(())
    }
}

impl<'a> Read for EntryData<'a> {
    // The logical byte stream: stored segments come from the archive,
    // every other position reads as zero.
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        let cursor = match self.segments {
            None => {
                if self.pos >= self.size {
                    return Ok(0);
                }
                let max = cmp::min(self.size - self.pos, into.len() as u64) as usize;
                let n = self.physical.read(&mut into[..max])?;
                self.pos += n as u64;
                return Ok(n);
            }
            Some(ref mut cursor) => cursor,
        };

        let mut total = 0;
        while total < into.len() && self.pos < self.size {
            let dest = &mut into[total..];
            cursor.skip_empty();
            match cursor.current() {
                // Past the last segment: the trailing hole.
                None => {
                    let n = cmp::min(self.size - self.pos, dest.len() as u64) as usize;
                    for byte in &mut dest[..n] {
                        *byte = 0;
                    }
                    self.pos += n as u64;
                    total += n;
                }
                // Before the next segment: a hole.
                Some(seg) if self.pos < seg.offset => {
                    let n = cmp::min(seg.offset - self.pos, dest.len() as u64) as usize;
                    for byte in &mut dest[..n] {
                        *byte = 0;
                    }
                    self.pos += n as u64;
                    total += n;
                }
                // Inside a segment: surface stored bytes.
                Some(seg) => {
                    let want = cmp::min(seg.end() - self.pos, dest.len() as u64) as usize;
                    let n = self.physical.read(&mut dest[..want])?;
                    if n == 0 {
                        // Physical stream ran dry mid-segment; a partial
                        // read is returned as a partial read.
                        return Ok(total);
                    }
                    self.pos += n as u64;
                    total += n;
                    cursor.advance_past(self.pos);
                }
            }
        }
        Ok(total)
    }
}

impl SparseCursor {
    fn current(&self) -> Option<SparseEntry> {
        self.segments.get(self.index).copied()
    }

    fn skip_empty(&mut self) {
        while self
            .segments
            .get(self.index)
            .map_or(false, |s| s.length == 0)
        {
            self.index += 1;
        }
    }

    fn advance_past(&mut self, pos: u64) {
        while self.segments.get(self.index).map_or(false, |s| s.end() <= pos) {
            self.index += 1;
        }
    }
}

impl<'a> PhysicalReader<'a> {
    /// Consumes up to `amt` bytes, returning how many were actually
    /// drained before the stream ran dry.
    fn drain(&mut self, mut amt: u64) -> Result<u64> {
        let mut buf = [0u8; 4096];
        let mut drained = 0;
        while amt > 0 {
            let n = cmp::min(amt, buf.len() as u64) as usize;
            match self.read(&mut buf[..n]) {
                Ok(0) => break,
                Ok(n) => {
                    drained += n as u64;
                    amt -= n as u64;
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(drained)
    }
}

impl<'a> Read for PhysicalReader<'a> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        if self.prefix_pos < self.prefix.len() {
            let n = cmp::min(self.prefix.len() - self.prefix_pos, into.len());
            into[..n].copy_from_slice(&self.prefix[self.prefix_pos..self.prefix_pos + n]);
            self.prefix_pos += n;
            return Ok(n);
        }
        self.inner.read(into)
    }
}

#[cfg(unix)]
fn bytes2path(bytes: Cow<[u8]>) -> Result<Cow<Path>> {
    use std::ffi::{OsStr, OsString};
    use std::os::unix::prelude::*;
    Ok(match bytes {
        Cow::Borrowed(bytes) => Cow::Borrowed(Path::new(OsStr::from_bytes(bytes))),
        Cow::Owned(bytes) => Cow::Owned(OsString::from_vec(bytes).into()),
    })
}

#[cfg(not(unix))]
fn bytes2path(bytes: Cow<[u8]>) -> Result<Cow<Path>> {
    use std::path::PathBuf;
    match bytes {
        Cow::Borrowed(bytes) => std::str::from_utf8(bytes)
            .map(|s| Cow::Borrowed(Path::new(s)))
            .map_err(|_| Error::InvalidOperation("path is not valid unicode".to_string())),
        Cow::Owned(bytes) => String::from_utf8(bytes)
            .map(|s| Cow::Owned(PathBuf::from(s)))
            .map_err(|_| Error::InvalidOperation("path is not valid unicode".to_string())),
    }
}
