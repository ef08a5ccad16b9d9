use std::io;

/// Alias for the result of a fallible `streamtar` operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding an archive.
///
/// The variants mirror the distinct failure classes of the format: a header
/// whose own fields fail validation, an inconsistency between records, an
/// I/O failure from the underlying reader, a recognized-but-unhandled
/// construct, and caller misuse of a streaming handle. End of archive is not
/// an error; the entry iterator simply terminates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A structural field of a header failed validation (magic, version,
    /// octal syntax, unknown type flag, empty path).
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Records are inconsistent with each other or with the stream
    /// (checksum mismatch, lone zero record, short read mid-record, a PAX
    /// record extending past its buffer).
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// An error propagated from the underlying reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A known construct this reader does not handle (multi-volume
    /// members, unsupported sparse format versions).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Caller misuse of a streaming handle (backward seek in streaming
    /// mode, reading data of a non-regular entry).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Rebuilds an equivalent error value so one copy can be latched on the
    /// iterator while the original is yielded to the caller. `io::Error` is
    /// not `Clone`, hence the reconstruction.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::InvalidHeader(m) => Error::InvalidHeader(m.clone()),
            Error::CorruptArchive(m) => Error::CorruptArchive(m.clone()),
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::UnsupportedFeature(m) => Error::UnsupportedFeature(m.clone()),
            Error::InvalidOperation(m) => Error::InvalidOperation(m.clone()),
        }
    }
}

pub(crate) fn invalid(msg: &str) -> Error {
    Error::InvalidHeader(msg.to_string())
}

pub(crate) fn corrupt(msg: &str) -> Error {
    Error::CorruptArchive(msg.to_string())
}
