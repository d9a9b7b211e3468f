//! The crate-wide error taxonomy surfaced by the file API.

/// Every fallible operation in this crate returns one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// Drive / codec failure that can't be classified further (timeout,
    /// CRC-exhaustion, coprocessor stall).
    Io,
    /// Directory entry does not exist, or mount failed for lack of a BPB
    /// signature.
    NotFound,
    /// Create of an existing name when not truncating. Reserved: currently
    /// subsumed by open-for-write semantics.
    Exists,
    /// No free cluster or no free directory entry.
    Full,
    /// Open-file table exhausted.
    TooManyOpen,
    /// Malformed argument, corrupt BPB, invalid cluster reference, or write
    /// attempted on a reader.
    Invalid,
    /// Open-for-read on a directory entry.
    IsDirectory,
    /// Operation attempted before mount, or after a disk change invalidated
    /// the mount.
    NotMounted,
    /// End of file / end of directory.
    Eof,
    /// Disk change detected since the last call; the mount is invalidated.
    DiskChanged,
    /// Write attempted on write-protected media.
    WriteProtected,
    /// Operation on a closed or foreign file handle.
    BadHandle,
    /// A write-then-verify loop exhausted all of its attempts.
    Verify,
}

impl Error {
    /// Maps an error to a short, stable, English description.
    pub fn as_str(self) -> &'static str {
        match self {
            Error::Io => "I/O error",
            Error::NotFound => "File not found",
            Error::Exists => "File exists",
            Error::Full => "Disk full",
            Error::TooManyOpen => "Too many open files",
            Error::Invalid => "Invalid argument",
            Error::IsDirectory => "Is a directory",
            Error::NotMounted => "Not mounted",
            Error::Eof => "End of file",
            Error::DiskChanged => "Disk changed",
            Error::WriteProtected => "Write protected",
            Error::BadHandle => "Bad file handle",
            Error::Verify => "Write verification failed",
        }
    }
}

using_std! {
    use std::fmt;

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl std::error::Error for Error { }
}

pub type Result<T> = core::result::Result<T, Error>;
