use std::fmt;

use crate::cartridge::header::NES_HEADER_LEN;

#[derive(Debug)]
pub enum Error {
    /// Provided buffer is shorter than the 16-byte header.
    TooShort { actual: usize },
    /// Magic number ("NES<EOF>") is missing.
    InvalidMagic,
    /// A ROM section (trainer/PRG/CHR) is shorter than advertised.
    SectionTooShort {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Header advertises a mapper number that this core does not implement.
    UnsupportedMapper(u16),
    /// Save-state blob was produced by an incompatible core version.
    SaveStateVersion { found: u32, supported: u32 },
    /// Save-state blob failed to decode.
    #[cfg(feature = "savestate")]
    SaveStateCodec(postcard::Error),
    /// Save state was captured with a different cartridge inserted.
    SaveStateMismatch,
    /// Wrapper for I/O errors raised while reading ROMs from disk.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { actual } => {
                write!(f, "header expected {NES_HEADER_LEN} bytes, got {actual}")
            }
            Self::InvalidMagic => write!(f, "missing NES magic bytes"),
            Self::SectionTooShort {
                section,
                expected,
                actual,
            } => write!(
                f,
                "{section} section expected {expected} bytes, got {actual}"
            ),
            Self::UnsupportedMapper(mapper) => {
                write!(f, "mapper {mapper} is not implemented")
            }
            Self::SaveStateVersion { found, supported } => {
                write!(
                    f,
                    "save state version {found} is not loadable (supported: {supported})"
                )
            }
            #[cfg(feature = "savestate")]
            Self::SaveStateCodec(err) => write!(f, "save state codec error: {err}"),
            Self::SaveStateMismatch => {
                write!(f, "save state belongs to a different cartridge")
            }
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(feature = "savestate")]
impl From<postcard::Error> for Error {
    fn from(value: postcard::Error) -> Self {
        Self::SaveStateCodec(value)
    }
}
