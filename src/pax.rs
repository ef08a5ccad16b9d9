#![allow(dead_code)]
use std::collections::BTreeMap;
use std::str;

use crate::error::{corrupt, invalid, Result};

// Keywords for PAX extended header records.
pub const PAX_PATH: &str = "path";
pub const PAX_LINKPATH: &str = "linkpath"; // Accepted but not applied
pub const PAX_SIZE: &str = "size";
pub const PAX_UID: &str = "uid"; // Currently unused
pub const PAX_GID: &str = "gid"; // Currently unused
pub const PAX_UNAME: &str = "uname"; // Currently unused
pub const PAX_GNAME: &str = "gname"; // Currently unused
pub const PAX_MTIME: &str = "mtime"; // Currently unused
pub const PAX_CHARSET: &str = "charset"; // Currently unused
pub const PAX_COMMENT: &str = "comment"; // Currently unused

// Prefixes for extended attributes in a PAX extended header.
pub const PAX_SCHILYXATTR: &str = "SCHILY.xattr.";
pub const PAX_LIBARCHIVEXATTR: &str = "LIBARCHIVE.xattr.";

// POSIX ACL text stored by star/libarchive.
pub const PAX_SCHILY_ACL_ACCESS: &str = "SCHILY.acl.access";
pub const PAX_SCHILY_ACL_DEFAULT: &str = "SCHILY.acl.default";

// Keywords for GNU sparse files in a PAX extended header.
pub const PAX_GNUSPARSEMAP: &str = "GNU.sparse.map";
pub const PAX_GNUSPARSENAME: &str = "GNU.sparse.name";
pub const PAX_GNUSPARSEMAJOR: &str = "GNU.sparse.major";
pub const PAX_GNUSPARSEMINOR: &str = "GNU.sparse.minor";
pub const PAX_GNUSPARSESIZE: &str = "GNU.sparse.size";
pub const PAX_GNUSPARSEREALSIZE: &str = "GNU.sparse.realsize";

/// The key/value context accumulated from PAX extended headers, applied to
/// the next real member. Later records override earlier ones.
pub(crate) type PaxMap = BTreeMap<String, Vec<u8>>;

/// An iterator over the records of a PAX extended header payload.
///
/// Each record is formatted `<length> <key>=<value>\n` where `<length>` is
/// the decimal byte count of the entire record, including the length digits
/// themselves, the space, and the trailing newline. Records are
/// concatenated with no separator; iteration stops at a NUL byte or the end
/// of the payload.
pub struct PaxExtensions<'entry> {
    data: &'entry [u8],
    pos: usize,
    done: bool,
}

impl<'entry> PaxExtensions<'entry> {
    /// Create a new pax extensions iterator from the given payload.
    pub fn new(data: &'entry [u8]) -> PaxExtensions<'entry> {
        PaxExtensions {
            data,
            pos: 0,
            done: false,
        }
    }
}

/// A key/value pair corresponding to one PAX record.
pub struct PaxExtension<'entry> {
    key: &'entry [u8],
    value: &'entry [u8],
}

impl<'entry> Iterator for PaxExtensions<'entry> {
    type Item = Result<PaxExtension<'entry>>;

    fn next(&mut self) -> Option<Result<PaxExtension<'entry>>> {
        if self.done || self.pos >= self.data.len() || self.data[self.pos] == 0 {
            return None;
        }

        match self.parse_record() {
            Ok(ext) => Some(Ok(ext)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<'entry> PaxExtensions<'entry> {
    fn parse_record(&mut self) -> Result<PaxExtension<'entry>> {
        let data = self.data;
        let record_start = self.pos;

        let mut cursor = record_start;
        while cursor < data.len() && data[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor == record_start {
            return Err(invalid("malformed pax record length field"));
        }
        if cursor >= data.len() || data[cursor] != b' ' {
            return Err(invalid("pax record length not followed by a space"));
        }

        // The digits are ASCII by construction.
        let length: usize = str::from_utf8(&data[record_start..cursor])
            .unwrap()
            .parse()
            .map_err(|_| invalid("pax record length out of range"))?;
        if length == 0 {
            return Err(invalid("pax record length cannot be zero"));
        }

        let record_end = match record_start.checked_add(length) {
            Some(end) if end <= data.len() => end,
            _ => return Err(corrupt("pax record extends beyond the header payload")),
        };

        let kv_start = cursor + 1;
        if record_end < kv_start {
            return Err(invalid("pax record shorter than its own length field"));
        }

        let mut value_end = record_end;
        if value_end > kv_start && data[value_end - 1] == b'\n' {
            value_end -= 1;
        }

        // The first '=' splits key from value; later ones belong to the
        // value.
        let equals = data[kv_start..value_end]
            .iter()
            .position(|b| *b == b'=')
            .ok_or_else(|| invalid("pax record missing '=' separator"))?;

        self.pos = record_end;
        Ok(PaxExtension {
            key: &data[kv_start..kv_start + equals],
            value: &data[kv_start + equals + 1..value_end],
        })
    }
}

impl<'entry> PaxExtension<'entry> {
    /// Returns the key for this key/value pair parsed as a string.
    ///
    /// May fail if the key isn't actually utf-8.
    pub fn key(&self) -> std::result::Result<&'entry str, str::Utf8Error> {
        str::from_utf8(self.key)
    }

    /// Returns the underlying raw bytes for the key of this key/value pair.
    pub fn key_bytes(&self) -> &'entry [u8] {
        self.key
    }

    /// Returns the value for this key/value pair parsed as a string.
    ///
    /// May fail if the value isn't actually utf-8.
    pub fn value(&self) -> std::result::Result<&'entry str, str::Utf8Error> {
        str::from_utf8(self.value)
    }

    /// Returns the underlying raw bytes for the value of this key/value
    /// pair.
    pub fn value_bytes(&self) -> &'entry [u8] {
        self.value
    }
}

/// Parses a PAX payload and merges its records into the pending context.
/// Later records override earlier ones, including across consecutive
/// extended headers.
pub(crate) fn merge_records(map: &mut PaxMap, data: &[u8]) -> Result<()> {
    for ext in PaxExtensions::new(data) {
        let ext = ext?;
        let key = String::from_utf8_lossy(ext.key_bytes()).into_owned();
        map.insert(key, ext.value_bytes().to_vec());
    }
    Ok(())
}

/// Decodes a PAX value as a decimal integer, `None` when malformed.
pub(crate) fn decimal(value: &[u8]) -> Option<u64> {
    let s = str::from_utf8(value).ok()?;
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

/// Returns whether the pending context announces a GNU sparse member.
pub(crate) fn has_gnu_sparse_markers(map: &PaxMap) -> bool {
    map.contains_key(PAX_GNUSPARSEMAJOR)
        || map.contains_key(PAX_GNUSPARSEMINOR)
        || map.contains_key(PAX_GNUSPARSEMAP)
}

/// Returns the `(major, minor)` GNU sparse format version announced by the
/// pending context, with absent or malformed components read as zero.
pub(crate) fn gnu_sparse_version(map: &PaxMap) -> (u64, u64) {
    let major = map
        .get(PAX_GNUSPARSEMAJOR)
        .and_then(|v| decimal(v))
        .unwrap_or(0);
    let minor = map
        .get(PAX_GNUSPARSEMINOR)
        .and_then(|v| decimal(v))
        .unwrap_or(0);
    (major, minor)
}

/// Collects `SCHILY.xattr.*` and `LIBARCHIVE.xattr.*` records into an
/// attribute-name → value map.
pub(crate) fn extract_xattrs(map: &PaxMap) -> BTreeMap<String, Vec<u8>> {
    let mut xattrs = BTreeMap::new();
    for (key, value) in map {
        let name = if key.starts_with(PAX_SCHILYXATTR) {
            &key[PAX_SCHILYXATTR.len()..]
        } else if key.starts_with(PAX_LIBARCHIVEXATTR) {
            &key[PAX_LIBARCHIVEXATTR.len()..]
        } else {
            continue;
        };
        if !name.is_empty() {
            xattrs.insert(name.to_string(), value.clone());
        }
    }
    xattrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        PaxExtensions::new(data)
            .map(|r| {
                let e = r.unwrap();
                (
                    String::from_utf8_lossy(e.key_bytes()).into_owned(),
                    e.value_bytes().to_vec(),
                )
            })
            .collect()
    }

    #[test]
    fn single_record() {
        let recs = parse_all(b"11 size=42\n");
        assert_eq!(recs, vec![("size".to_string(), b"42".to_vec())]);
    }

    #[test]
    fn concatenated_records() {
        let recs = parse_all(b"11 size=42\n12 path=big\n");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].0, "size");
        assert_eq!(recs[1], ("path".to_string(), b"big".to_vec()));
    }

    #[test]
    fn equals_in_value_preserved() {
        let recs = parse_all(b"15 comment=a=b\n");
        assert_eq!(recs, vec![("comment".to_string(), b"a=b".to_vec())]);
    }

    #[test]
    fn stops_at_nul() {
        let recs = parse_all(b"11 size=42\n\0garbage");
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn missing_newline_at_end_tolerated() {
        let recs = parse_all(b"10 size=42");
        assert_eq!(recs, vec![("size".to_string(), b"42".to_vec())]);
    }

    #[test]
    fn zero_length_rejected() {
        let mut it = PaxExtensions::new(b"0 x=y\n");
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn record_overrunning_buffer_rejected() {
        let mut it = PaxExtensions::new(b"99 size=42\n");
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn non_digit_length_rejected() {
        let mut it = PaxExtensions::new(b"x12 size=42\n");
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn missing_equals_rejected() {
        let mut it = PaxExtensions::new(b"8 size42\n");
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn later_records_override() {
        let mut map = PaxMap::new();
        merge_records(&mut map, b"11 size=42\n11 size=43\n").unwrap();
        assert_eq!(map.get("size").unwrap(), b"43");
    }

    #[test]
    fn xattr_extraction_both_prefixes() {
        let mut map = PaxMap::new();
        merge_records(
            &mut map,
            b"30 SCHILY.xattr.user.test=val\n37 LIBARCHIVE.xattr.user.other=other\n",
        )
        .unwrap();
        let xattrs = extract_xattrs(&map);
        assert_eq!(xattrs.get("user.test").unwrap(), b"val");
        assert_eq!(xattrs.get("user.other").unwrap(), b"other");
    }

    #[test]
    fn sparse_version_defaults_to_zero() {
        let mut map = PaxMap::new();
        assert_eq!(gnu_sparse_version(&map), (0, 0));
        merge_records(&mut map, b"22 GNU.sparse.major=1\n22 GNU.sparse.minor=0\n").unwrap();
        assert!(has_gnu_sparse_markers(&map));
        assert_eq!(gnu_sparse_version(&map), (1, 0));
    }
}
