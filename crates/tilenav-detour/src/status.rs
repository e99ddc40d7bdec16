//! Status codes for tile packing and navmesh assembly

/// Failure of a navigation mesh operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Provided parameter was invalid
    InvalidParam,
    /// Operation ran out of memory or free tile slots
    OutOfMemory,
    /// Data has the wrong magic number
    WrongMagic,
    /// Data has the wrong version
    WrongVersion,
    /// A tile already occupies the requested location
    AlreadyExists,
    /// Input data is truncated or inconsistent
    DataCorrupted,
    /// Reading or writing a file failed
    Io(std::io::ErrorKind),
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfMemory => write!(f, "Out of memory"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
            Status::AlreadyExists => write!(f, "Value already exists"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::Io(kind) => write!(f, "I/O error: {}", kind),
        }
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Status::DataCorrupted,
            kind => Status::Io(kind),
        }
    }
}

impl From<Status> for tilenav_common::Error {
    fn from(status: Status) -> Self {
        tilenav_common::Error::Detour(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_errors_map_to_status() {
        let eof = Error::new(ErrorKind::UnexpectedEof, "short read");
        assert_eq!(Status::from(eof), Status::DataCorrupted);

        let missing = Error::new(ErrorKind::NotFound, "no such file");
        assert_eq!(Status::from(missing), Status::Io(ErrorKind::NotFound));
    }

    #[test]
    fn test_status_converts_to_common_error() {
        let err = tilenav_common::Error::from(Status::WrongMagic);
        assert!(err.to_string().contains("Wrong magic number"));
    }
}
