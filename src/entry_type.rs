use crate::error::{Error, Result};

/// Indicates the type of archive member described by a header.
///
/// Each `Header` has an `entry_type` method returning an instance of this
/// type which can be used to inspect what the header is describing. The set
/// is closed: a type-flag byte outside it is rejected during decoding.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryType {
    /// Regular file (`'0'`, or NUL in pre-POSIX archives).
    Regular,
    /// Hard link (`'1'`).
    Link,
    /// Symbolic link (`'2'`).
    Symlink,
    /// Character device (`'3'`).
    Char,
    /// Block device (`'4'`).
    Block,
    /// Directory (`'5'`).
    Directory,
    /// FIFO (`'6'`).
    Fifo,
    /// Contiguous file (`'7'`), treated like a regular file.
    Continuous,
    /// PAX extended header (`'x'`), applies to the next member.
    XHeader,
    /// PAX global extended header (`'g'`).
    XGlobalHeader,
    /// GNU long-name extension (`'L'`).
    GNULongName,
    /// GNU long-link extension (`'K'`).
    GNULongLink,
    /// GNU sparse file (`'S'`).
    GNUSparse,
    /// GNU volume header (`'V'`), payload is skipped.
    GNUVolumeHeader,
    /// GNU multi-volume continuation (`'M'`), payload is skipped.
    GNUMultiVolume,
}

impl EntryType {
    /// Maps a raw type-flag byte to an entry type.
    ///
    /// Any byte outside the known set is an unsupported-feature error; a
    /// POSIX-compliant *extractor* may treat unknown flags as regular
    /// files, but for decoding purposes an unknown flag means the archive
    /// uses a construct this reader does not understand.
    pub fn from_byte(byte: u8) -> Result<EntryType> {
        Ok(match byte {
            0 | b'0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Continuous,
            b'x' => EntryType::XHeader,
            b'g' => EntryType::XGlobalHeader,
            b'L' => EntryType::GNULongName,
            b'K' => EntryType::GNULongLink,
            b'S' => EntryType::GNUSparse,
            b'V' => EntryType::GNUVolumeHeader,
            b'M' => EntryType::GNUMultiVolume,
            b => {
                return Err(Error::UnsupportedFeature(format!(
                    "unknown entry type flag {:?}",
                    b as char
                )))
            }
        })
    }

    /// Returns the raw underlying type-flag byte.
    pub fn as_byte(&self) -> u8 {
        match *self {
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Continuous => b'7',
            EntryType::XHeader => b'x',
            EntryType::XGlobalHeader => b'g',
            EntryType::GNULongName => b'L',
            EntryType::GNULongLink => b'K',
            EntryType::GNUSparse => b'S',
            EntryType::GNUVolumeHeader => b'V',
            EntryType::GNUMultiVolume => b'M',
        }
    }

    /// Returns whether this type represents a regular file.
    pub fn is_file(&self) -> bool {
        *self == EntryType::Regular || *self == EntryType::Continuous
    }

    /// Returns whether this type represents a hard link.
    pub fn is_hard_link(&self) -> bool {
        *self == EntryType::Link
    }

    /// Returns whether this type represents a symlink.
    pub fn is_symlink(&self) -> bool {
        *self == EntryType::Symlink
    }

    /// Returns whether this type represents a character device.
    pub fn is_character_special(&self) -> bool {
        *self == EntryType::Char
    }

    /// Returns whether this type represents a block device.
    pub fn is_block_special(&self) -> bool {
        *self == EntryType::Block
    }

    /// Returns whether this type represents a device of either kind.
    pub fn is_device(&self) -> bool {
        self.is_character_special() || self.is_block_special()
    }

    /// Returns whether this type represents a directory.
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }

    /// Returns whether this type represents a FIFO.
    pub fn is_fifo(&self) -> bool {
        *self == EntryType::Fifo
    }

    /// Returns whether this type represents a contiguous file.
    pub fn is_contiguous(&self) -> bool {
        *self == EntryType::Continuous
    }

    /// Returns whether this type represents a hard or symbolic link.
    pub fn is_link(&self) -> bool {
        self.is_hard_link() || self.is_symlink()
    }

    /// Returns whether this type represents a GNU long-name extension.
    pub fn is_gnu_longname(&self) -> bool {
        *self == EntryType::GNULongName
    }

    /// Returns whether this type represents a GNU long-link extension.
    pub fn is_gnu_longlink(&self) -> bool {
        *self == EntryType::GNULongLink
    }

    /// Returns whether this type represents a GNU sparse file.
    pub fn is_gnu_sparse(&self) -> bool {
        *self == EntryType::GNUSparse
    }

    /// Returns whether this type represents a PAX extended header applying
    /// to the next member.
    pub fn is_pax_local_extensions(&self) -> bool {
        *self == EntryType::XHeader
    }

    /// Returns whether this type represents a PAX global extended header.
    pub fn is_pax_global_extensions(&self) -> bool {
        *self == EntryType::XGlobalHeader
    }

    /// Returns whether a header of this type contributes to a later member
    /// rather than describing one itself.
    pub fn is_extension(&self) -> bool {
        match *self {
            EntryType::XHeader
            | EntryType::XGlobalHeader
            | EntryType::GNULongName
            | EntryType::GNULongLink
            | EntryType::GNUVolumeHeader
            | EntryType::GNUMultiVolume => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EntryType;

    #[test]
    fn known_bytes_round_trip() {
        for &b in b"01234567xgLKSVM" {
            let ty = EntryType::from_byte(b).unwrap();
            assert_eq!(ty.as_byte(), b);
        }
        assert_eq!(EntryType::from_byte(0).unwrap(), EntryType::Regular);
    }

    #[test]
    fn unknown_byte_rejected() {
        assert!(EntryType::from_byte(b'Z').is_err());
        assert!(EntryType::from_byte(b'8').is_err());
        assert!(EntryType::from_byte(b' ').is_err());
    }
}
