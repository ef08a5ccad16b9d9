use std::cell::{Cell, RefCell};
use std::cmp;
use std::collections::BTreeMap;
use std::io::prelude::*;
use std::io;
use std::marker;
use std::str;

use crate::acl;
use crate::entry::{Entry, EntryData, EntryFields};
use crate::entry_type::EntryType;
use crate::error::{corrupt, invalid, Error, Result};
use crate::header::{GnuExtSparseHeader, Header, BLOCK_SIZE};
use crate::pax::{self, PaxMap};
use crate::sparse::{self, SparseEntry, SparseMap};

/// A top-level representation of an archive file.
///
/// This archive can be iterated over to yield its members one at a time,
/// in a streaming fashion: the underlying reader is consumed strictly
/// forward and never required to seek.
pub struct Archive<R: ?Sized + Read> {
    inner: ArchiveInner<R>,
}

pub(crate) struct ArchiveInner<R: ?Sized> {
    pos: Cell<u64>,
    obj: RefCell<R>,
}

/// An iterator over the members of an archive.
///
/// Yielded entries must be processed in sequence: moving the iterator
/// forward invalidates the data handle of every previously yielded entry
/// (their metadata remains usable). If decoding fails, the error is
/// yielded once, the iterator terminates, and the retained error stays
/// inspectable through [`Entries::error`].
pub struct Entries<'a, R: 'a + Read> {
    fields: EntriesFields<'a>,
    _ignored: marker::PhantomData<&'a Archive<R>>,
}

struct EntriesFields<'a> {
    archive: &'a Archive<dyn Read + 'a>,
    next: u64,
    done: bool,
    latched: Option<Error>,
}

impl<R: Read> Archive<R> {
    /// Create a new archive with the underlying object as the reader.
    pub fn new(obj: R) -> Archive<R> {
        Archive {
            inner: ArchiveInner {
                pos: Cell::new(0),
                obj: RefCell::new(obj),
            },
        }
    }

    /// Unwrap this archive, returning the underlying object.
    pub fn into_inner(self) -> R {
        self.inner.obj.into_inner()
    }

    /// Construct an iterator over the members of this archive.
    ///
    /// The reader must be positioned at the start of the archive; the
    /// iterator is forward-only and not restartable.
    pub fn entries(&mut self) -> Result<Entries<'_, R>> {
        let me: &mut Archive<dyn Read> = self;
        me._entries().map(|fields| Entries {
            fields,
            _ignored: marker::PhantomData,
        })
    }
}

impl<'a> Archive<dyn Read + 'a> {
    fn _entries(&mut self) -> Result<EntriesFields<'_>> {
        if self.inner.pos.get() != 0 {
            return Err(Error::InvalidOperation(
                "cannot call entries unless archive is at position 0".to_string(),
            ));
        }
        Ok(EntriesFields {
            archive: self,
            next: 0,
            done: false,
            latched: None,
        })
    }

    fn skip(&self, mut amt: u64) -> Result<()> {
        let mut buf = [0u8; 4096 * 8];
        while amt > 0 {
            let n = cmp::min(amt, buf.len() as u64);
            let n = (&self.inner).read(&mut buf[..n as usize])?;
            if n == 0 {
                return Err(corrupt("unexpected end of archive while skipping"));
            }
            amt -= n as u64;
        }
        Ok(())
    }
}

impl<'a, R: Read> Entries<'a, R> {
    /// Returns the error that terminated iteration, if any.
    ///
    /// Populated once a `next()` call has yielded `Err`; later calls
    /// return `None` (end of sequence) while the error stays readable
    /// here.
    pub fn error(&self) -> Option<&Error> {
        self.fields.latched.as_ref()
    }
}

impl<'a, R: Read> Iterator for Entries<'a, R> {
    type Item = Result<Entry<'a, R>>;

    fn next(&mut self) -> Option<Result<Entry<'a, R>>> {
        if self.fields.done {
            return None;
        }
        match self.fields.next_entry() {
            Ok(Some(fields)) => Some(Ok(fields.into_entry())),
            Ok(None) => {
                self.fields.done = true;
                None
            }
            Err(e) => {
                self.fields.done = true;
                self.fields.latched = Some(e.duplicate());
                Some(Err(e))
            }
        }
    }
}

impl<'a> EntriesFields<'a> {
    fn next_entry(&mut self) -> Result<Option<EntryFields<'a>>> {
        let mut gnu_longname: Option<Vec<u8>> = None;
        let mut gnu_longlink: Option<Vec<u8>> = None;
        let mut pax_map: Option<PaxMap> = None;
        let mut pax_raw: Option<Vec<u8>> = None;

        loop {
            // Skip whatever the caller left unread of the previous member,
            // plus its padding, so the stream sits at the next header.
            let delta = self.next - self.archive.inner.pos.get();
            self.archive.skip(delta)?;

            let header = match self.read_header()? {
                Some(header) => header,
                None if gnu_longname.is_some() || gnu_longlink.is_some() || pax_map.is_some() => {
                    return Err(corrupt(
                        "extension records describe a member but no member follows",
                    ))
                }
                None => return Ok(None),
            };

            header.check_magic()?;
            header.verify_cksum()?;
            let kind = header.entry_type()?;
            let size = header.entry_size()?;
            if header.path_bytes().is_empty() {
                return Err(invalid("member has an empty path"));
            }
            // Invalid octal anywhere in the header is fatal for the whole
            // iteration, extension records included.
            header.mode()?;
            header.uid()?;
            header.gid()?;
            header.mtime()?;

            match kind {
                EntryType::GNULongName => {
                    if gnu_longname.is_some() {
                        return Err(corrupt(
                            "two long-name entries describing the same member",
                        ));
                    }
                    gnu_longname = Some(trim_nuls(self.read_payload(size)?));
                }
                EntryType::GNULongLink => {
                    if gnu_longlink.is_some() {
                        return Err(corrupt(
                            "two long-link entries describing the same member",
                        ));
                    }
                    gnu_longlink = Some(trim_nuls(self.read_payload(size)?));
                }
                EntryType::XHeader => {
                    let data = self.read_payload(size)?;
                    pax::merge_records(pax_map.get_or_insert_with(PaxMap::new), &data)?;
                    pax_raw.get_or_insert_with(Vec::new).extend_from_slice(&data);
                }
                EntryType::XGlobalHeader => {
                    // Parsed for well-formedness, then discarded. POSIX
                    // says global records apply to all later members; this
                    // reader does not honour that and treats them as
                    // documentation.
                    let data = self.read_payload(size)?;
                    pax::merge_records(&mut PaxMap::new(), &data)?;
                }
                EntryType::GNUVolumeHeader | EntryType::GNUMultiVolume => {
                    self.skip_payload(size)?;
                }
                _ => {
                    let fields = self.assemble(
                        header,
                        kind,
                        size,
                        gnu_longname,
                        gnu_longlink,
                        pax_map,
                        pax_raw,
                    )?;
                    return Ok(Some(fields));
                }
            }
        }
    }

    /// Reads the next header record, detecting the archive terminator.
    ///
    /// `Ok(None)` is end-of-archive: two consecutive zero records, a zero
    /// record at the very end of the stream, or a stream that is exhausted
    /// exactly at a record boundary.
    fn read_header(&mut self) -> Result<Option<Header>> {
        let mut header = Header::new_old();
        if !self.read_block(header.as_mut_bytes())? {
            return Ok(None);
        }
        self.next += BLOCK_SIZE;

        if !header.as_bytes().iter().any(|i| *i != 0) {
            // A zero record is never a valid header (the checksum could
            // not hold), so it must open the two-record terminator or sit
            // at the very end of the stream.
            let mut second = [0; 512];
            if !self.read_block(&mut second)? {
                return Ok(None);
            }
            self.next += BLOCK_SIZE;
            return if !second.iter().any(|i| *i != 0) {
                Ok(None)
            } else {
                Err(corrupt("lone zero record not followed by a second zero record"))
            };
        }

        Ok(Some(header))
    }

    /// Reads one exact 512-byte record. `Ok(false)` means not a single
    /// byte was produced and the stream is exhausted; any other short read
    /// is corruption.
    fn read_block(&self, block: &mut [u8]) -> Result<bool> {
        let mut read = 0;
        while read < block.len() {
            match (&self.archive.inner).read(&mut block[read..])? {
                0 if read == 0 => return Ok(false),
                0 => return Err(corrupt("short read in the middle of a record")),
                n => read += n,
            }
        }
        Ok(true)
    }

    /// Reads an extension payload of `size` bytes plus its padding to the
    /// next record boundary.
    fn read_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        let cap = cmp::min(size, 128 * 1024);
        let mut data = Vec::with_capacity(cap as usize);
        let n = (&self.archive.inner).take(size).read_to_end(&mut data)?;
        if (n as u64) < size {
            return Err(corrupt("extension payload cut short"));
        }
        let padded = padded_size(size);
        self.archive.skip(padded - size)?;
        self.next += padded;
        Ok(data)
    }

    /// Skips an extension payload plus its padding without looking at it.
    fn skip_payload(&mut self, size: u64) -> Result<()> {
        let padded = padded_size(size);
        self.archive.skip(padded)?;
        self.next += padded;
        Ok(())
    }

    /// Turns the final, non-extension header plus the accumulated context
    /// into a fully assembled entry.
    ///
    /// Overrides apply lowest to highest: ustar fields, GNU long
    /// name/link, PAX `path`/`size` (plus `GNU.sparse.name`), PAX
    /// xattr/ACL records, sparse descriptor.
    fn assemble(
        &mut self,
        header: Header,
        kind: EntryType,
        size: u64,
        gnu_longname: Option<Vec<u8>>,
        gnu_longlink: Option<Vec<u8>>,
        pax_map: Option<PaxMap>,
        pax_raw: Option<Vec<u8>>,
    ) -> Result<EntryFields<'a>> {
        let mut entry_type = kind;
        // The number of payload bytes physically present in the archive
        // for this member; the logical size may be larger for sparse
        // members.
        let mut wire_size = size;

        // Old-style (0.0) sparse map in the GNU header overlay.
        let mut sparse_map: Option<SparseMap> = None;
        if let Some(gnu) = header.as_gnu() {
            if kind == EntryType::Regular || kind == EntryType::GNUSparse {
                if let Some((mut segments, extended)) = sparse::from_gnu_header(gnu) {
                    if extended {
                        self.read_sparse_continuations(&mut segments)?;
                    }
                    let real_size = sparse::resolve_real_size(gnu, &segments);
                    sparse_map = Some(SparseMap::new(segments, real_size)?);
                    entry_type = EntryType::Regular;
                }
            }
        }
        if kind == EntryType::GNUSparse && sparse_map.is_none() {
            return Err(invalid("sparse member carries no sparse map"));
        }

        if entry_type.is_device() {
            if let Some(major) = header.device_major() {
                major?;
            }
            if let Some(minor) = header.device_minor() {
                minor?;
            }
        }

        let mut pax_path: Option<Vec<u8>> = None;
        let mut xattrs = BTreeMap::new();
        let mut acl_access = Vec::new();
        let mut acl_default = Vec::new();
        let mut surplus = Vec::new();
        let mut map_block_bytes = 0;

        if let Some(map) = pax_map.as_ref() {
            if let Some(path) = map.get(pax::PAX_PATH) {
                pax_path = Some(path.clone());
            }
            // A malformed size override is silently ignored and the ustar
            // size kept. Long-standing quirk, preserved as documented
            // behaviour rather than generalized.
            if let Some(size) = map.get(pax::PAX_SIZE).and_then(|v| pax::decimal(v)) {
                wire_size = size;
            }

            if pax::has_gnu_sparse_markers(map) {
                match pax::gnu_sparse_version(map) {
                    (1, 0) => {
                        let real_size = map
                            .get(pax::PAX_GNUSPARSEREALSIZE)
                            .and_then(|v| pax::decimal(v))
                            .unwrap_or(wire_size);
                        let (segments, leftover, blocks) =
                            self.read_sparse_data_map(wire_size)?;
                        surplus = leftover;
                        map_block_bytes = blocks * BLOCK_SIZE;
                        sparse_map = Some(SparseMap::new(segments, real_size)?);
                        if let Some(name) = map.get(pax::PAX_GNUSPARSENAME) {
                            pax_path = Some(name.clone());
                        }
                        entry_type = EntryType::Regular;
                    }
                    (0, _) => {
                        if let Some(value) = map.get(pax::PAX_GNUSPARSEMAP) {
                            let segments = sparse::parse_pax_map(value)?;
                            let real_size = map
                                .get(pax::PAX_GNUSPARSEREALSIZE)
                                .and_then(|v| pax::decimal(v))
                                .unwrap_or_else(|| {
                                    segments.last().map(|s| s.end()).unwrap_or(0)
                                });
                            sparse_map = Some(SparseMap::new(segments, real_size)?);
                            entry_type = EntryType::Regular;
                        }
                    }
                    (major, minor) => {
                        return Err(Error::UnsupportedFeature(format!(
                            "GNU sparse format {}.{}",
                            major, minor
                        )))
                    }
                }
            }

            xattrs = pax::extract_xattrs(map);
            if let Some(text) = map.get(pax::PAX_SCHILY_ACL_ACCESS) {
                acl_access = acl::parse_acl(acl_text(text)?)?;
            }
            if let Some(text) = map.get(pax::PAX_SCHILY_ACL_DEFAULT) {
                acl_default = acl::parse_acl(acl_text(text)?)?;
            }
        }

        // Account for the whole member payload up front: the iterator
        // always advances past unread payload and padding before the next
        // header.
        self.next += padded_size(wire_size);

        let logical_size = match sparse_map.as_ref() {
            Some(map) => map.real_size(),
            None => wire_size,
        };
        let take = (&self.archive.inner).take(wire_size.saturating_sub(map_block_bytes));
        let data = EntryData::new(surplus, take, sparse_map.as_ref(), logical_size);

        Ok(EntryFields {
            header,
            entry_type,
            size: logical_size,
            long_pathname: gnu_longname,
            long_linkname: gnu_longlink,
            pax_path,
            pax_extensions: pax_raw,
            xattrs,
            acl_access,
            acl_default,
            sparse: sparse_map,
            data,
            scratch: Vec::new(),
        })
    }

    /// Reads the extended-sparse records that continue an old-style sparse
    /// map past its four header slots.
    fn read_sparse_continuations(&mut self, segments: &mut Vec<SparseEntry>) -> Result<()> {
        let mut ext = GnuExtSparseHeader::new();
        ext.isextended[0] = b'1';
        while ext.is_extended() {
            if !self.read_block(ext.as_mut_bytes())? {
                return Err(corrupt("archive ends inside an extended sparse map"));
            }
            self.next += BLOCK_SIZE;
            sparse::collect_ext(&ext, segments);
        }
        Ok(())
    }

    /// Reads the decimal sparse map stored at the front of a format-1.0
    /// member's payload.
    ///
    /// Whole 512-byte blocks are consumed until the map is complete;
    /// returns the segments, the unconsumed remainder of the last block
    /// (payload bytes, not map), and the number of blocks read.
    fn read_sparse_data_map(
        &mut self,
        wire_size: u64,
    ) -> Result<(Vec<SparseEntry>, Vec<u8>, u64)> {
        let mut buf: Vec<u8> = Vec::with_capacity(BLOCK_SIZE as usize);
        let mut blocks = 0u64;
        loop {
            if blocks * BLOCK_SIZE >= wire_size {
                return Err(corrupt("sparse map extends past the member data"));
            }
            let mut block = [0; 512];
            if !self.read_block(&mut block)? {
                return Err(corrupt("archive ends inside a sparse data map"));
            }
            blocks += 1;
            buf.extend_from_slice(&block);

            if let Some((segments, consumed)) = sparse::parse_data_map(&buf)? {
                let surplus = buf[consumed..].to_vec();
                return Ok((segments, surplus, blocks));
            }
        }
    }
}

impl<'a, R: ?Sized + Read> Read for &'a ArchiveInner<R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        self.obj.borrow_mut().read(into).map(|i| {
            self.pos.set(self.pos.get() + i as u64);
            i
        })
    }
}

fn padded_size(size: u64) -> u64 {
    (size + (BLOCK_SIZE - 1)) & !(BLOCK_SIZE - 1)
}

/// GNU long-name/long-link payloads are NUL-terminated strings; the
/// terminator (and any padding NULs a writer left) is not part of the
/// name.
fn trim_nuls(mut bytes: Vec<u8>) -> Vec<u8> {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

fn acl_text(value: &[u8]) -> Result<&str> {
    str::from_utf8(value).map_err(|_| invalid("ACL text is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::padded_size;

    #[test]
    fn padding_math() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 512);
        assert_eq!(padded_size(511), 512);
        assert_eq!(padded_size(512), 512);
        assert_eq!(padded_size(513), 1024);
        assert_eq!(padded_size(512 * 3 - 1), 512 * 3);
    }
}
