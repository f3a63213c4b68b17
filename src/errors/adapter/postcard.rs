use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoding failures of [`postcard`], reduced to what mission records can
/// run into. Unlike `postcard::Error` it is `Copy` and can be formatted with
/// `defmt`.
#[non_exhaustive]
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostcardError {
    #[error("Record does not fit in the encoding buffer")]
    BufferFull,
    #[error("Record contains a sequence of unknown length")]
    UnknownLength,
    #[error("Record failed to serialize")]
    Serialize,
}

impl From<postcard::Error> for PostcardError {
    fn from(value: postcard::Error) -> Self {
        match value {
            postcard::Error::SerializeBufferFull => Self::BufferFull,
            postcard::Error::SerializeSeqLengthUnknown => Self::UnknownLength,
            _ => Self::Serialize,
        }
    }
}
