use std::fmt;
use std::path::PathBuf;

/// Errors surfaced by the engine, backings, and protocol layer.
///
/// Variants correspond 1:1 with the rows of the error-handling table: the
/// fatal ones are returned up to `main` and logged before exit; the
/// "warn, continue" ones are logged with `log::warn!` at the call site and
/// never constructed here (see the comment on each backing method).
#[derive(Debug)]
pub enum EngineError {
    HostUnreachable { host: String, source: String },
    RegistrationRejected { host: String, status: u16 },
    InvalidBackingPath { path: PathBuf },
    CorruptDiskmap { path: PathBuf, reason: String },
    UnrecognizedBacking { path: PathBuf },
    Io { path: Option<PathBuf>, source: std::io::Error },
    Dma { source: String },
    ShortenCollision { stem: String },
    UnknownDrive { drive: char },
    InvalidSector { track: u16, sector: u8 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::HostUnreachable { host, source } => {
                write!(f, "host {host} unreachable: {source}")
            }
            EngineError::RegistrationRejected { host, status } => {
                write!(f, "host {host} rejected FIF registration: HTTP {status}")
            }
            EngineError::InvalidBackingPath { path } => {
                write!(f, "{} is neither a regular file nor a directory", path.display())
            }
            EngineError::CorruptDiskmap { path, reason } => {
                write!(f, "diskmap {} is corrupt: {reason}", path.display())
            }
            EngineError::UnrecognizedBacking { path } => {
                write!(f, "backing at {} is not a recognized image or directory shape", path.display())
            }
            EngineError::Io { path: Some(path), source } => {
                write!(f, "I/O error on {}: {source}", path.display())
            }
            EngineError::Io { path: None, source } => write!(f, "I/O error: {source}"),
            EngineError::Dma { source } => write!(f, "DMA transport error: {source}"),
            EngineError::ShortenCollision { stem } => {
                write!(f, "too many short-name collisions for stem {stem}")
            }
            EngineError::UnknownDrive { drive } => write!(f, "unknown drive letter {drive}"),
            EngineError::InvalidSector { track, sector } => {
                write!(f, "invalid physical sector {sector} on track {track}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(source: std::io::Error) -> Self {
        EngineError::Io { path: None, source }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
