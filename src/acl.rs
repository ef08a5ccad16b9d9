//! Decoder for the POSIX ACL text representation stored in PAX records.
//!
//! `star` and libarchive serialize access and default ACLs into the
//! `SCHILY.acl.access` / `SCHILY.acl.default` keys as comma-separated
//! `type:id:perm` entries, e.g. `user::rwx,group::r-x,user:1000:rw-,other::r--`.

use crate::error::{invalid, Result};

/// The subject an ACL entry applies to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AclTag {
    /// The owning user of the file (`user::`).
    UserObj,
    /// The owning group of the file (`group::`).
    GroupObj,
    /// A named user (`user:<uid>:`).
    User,
    /// A named group (`group:<gid>:`).
    Group,
    /// The effective-rights mask (`mask::`).
    Mask,
    /// Everyone else (`other::`).
    Other,
}

/// One decoded ACL entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AclEntry {
    /// The subject this entry applies to.
    pub tag: AclTag,
    /// Numeric uid/gid; meaningful only when `tag` is [`AclTag::User`] or
    /// [`AclTag::Group`].
    pub id: u32,
    /// Permission bits: read = 4, write = 2, execute = 1.
    pub perms: u8,
}

impl AclEntry {
    /// Read permission bit.
    pub const READ: u8 = 4;
    /// Write permission bit.
    pub const WRITE: u8 = 2;
    /// Execute permission bit.
    pub const EXECUTE: u8 = 1;

    /// Returns whether this entry grants read access.
    pub fn can_read(&self) -> bool {
        self.perms & AclEntry::READ != 0
    }

    /// Returns whether this entry grants write access.
    pub fn can_write(&self) -> bool {
        self.perms & AclEntry::WRITE != 0
    }

    /// Returns whether this entry grants execute access.
    pub fn can_execute(&self) -> bool {
        self.perms & AclEntry::EXECUTE != 0
    }
}

/// Parses ACL text into its entries.
///
/// Entries are comma-separated with surrounding whitespace stripped; each
/// has exactly three colon-separated parts. An empty id on a `user` or
/// `group` entry selects the file's own owner/group; `mask` and `other`
/// take no id at all.
pub fn parse_acl(text: &str) -> Result<Vec<AclEntry>> {
    let mut entries = Vec::new();

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let mut parts = raw.splitn(3, ':');
        let (ty, id, perm) = match (parts.next(), parts.next(), parts.next()) {
            (Some(ty), Some(id), Some(perm)) => (ty, id, perm),
            _ => return Err(invalid(&format!("malformed ACL entry {:?}", raw))),
        };

        let tag = match (ty, id.is_empty()) {
            ("user", true) => AclTag::UserObj,
            ("user", false) => AclTag::User,
            ("group", true) => AclTag::GroupObj,
            ("group", false) => AclTag::Group,
            ("mask", _) => AclTag::Mask,
            ("other", _) => AclTag::Other,
            _ => return Err(invalid(&format!("unknown ACL entry type {:?}", ty))),
        };
        if (tag == AclTag::Mask || tag == AclTag::Other) && !id.is_empty() {
            return Err(invalid(&format!("unexpected id on ACL entry {:?}", raw)));
        }

        let id = if id.is_empty() {
            0
        } else {
            id.parse::<u32>()
                .map_err(|_| invalid(&format!("invalid ACL id {:?}", id)))?
        };

        entries.push(AclEntry {
            tag,
            id,
            perms: parse_perms(perm)?,
        });
    }

    Ok(entries)
}

fn parse_perms(perm: &str) -> Result<u8> {
    let bytes = perm.as_bytes();
    if bytes.len() != 3 {
        return Err(invalid(&format!("invalid ACL permission field {:?}", perm)));
    }
    let mut perms = 0;
    for (i, (&byte, &(letter, bit))) in bytes
        .iter()
        .zip([(b'r', AclEntry::READ), (b'w', AclEntry::WRITE), (b'x', AclEntry::EXECUTE)].iter())
        .enumerate()
    {
        if byte == letter {
            perms |= bit;
        } else if byte != b'-' {
            return Err(invalid(&format!(
                "invalid ACL permission character {:?} at position {}",
                byte as char, i
            )));
        }
    }
    Ok(perms)
}
