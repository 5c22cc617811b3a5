use crate::{codec::Codec, params::ParameterError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the adapters and codec backends.
///
/// The variants fall into a few kinds that callers usually want to tell
/// apart: misuse of an adapter ([`InvalidArgument`](Error::InvalidArgument),
/// [`Finished`](Error::Finished), [`Poisoned`](Error::Poisoned),
/// [`Released`](Error::Released), [`Parameter`](Error::Parameter)), corrupt
/// or truncated input ([`InvalidData`](Error::InvalidData)), a native
/// library failure ([`Codec`](Error::Codec)) and allocation failure
/// ([`OutOfMemory`](Error::OutOfMemory)).
///
/// The [`std::io::Read`] and [`std::io::Write`] impls convert these into
/// [`std::io::Error`] with a matching [`std::io::ErrorKind`]. The original
/// error stays available through [`std::io::Error::get_ref`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("stream has already been finished")]
    Finished,

    #[error("stream can no longer be used after an earlier error")]
    Poisoned,

    #[error("underlying stream has already been released")]
    Released,

    #[error("{codec} stream is corrupt or truncated: {message}")]
    InvalidData { codec: Codec, message: String },

    #[error("{codec} codec failed with code {code}: {message}")]
    Codec {
        codec: Codec,
        code: i64,
        message: String,
    },

    #[error("{codec} codec ran out of memory")]
    OutOfMemory { codec: Codec },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    /// Unwraps errors that were converted into [`std::io::Error`] by one of
    /// the adapters, so they keep their original variant.
    fn from(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Self::Io(err);
        }

        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(inner)) => Self::Io(std::io::Error::new(kind, inner)),
            None => Self::Io(kind.into()),
        }
    }
}

impl Error {
    pub(crate) fn invalid_data(codec: Codec, message: impl Into<String>) -> Self {
        Self::InvalidData {
            codec,
            message: message.into(),
        }
    }

    pub(crate) fn codec(codec: Codec, code: impl Into<i64>, message: impl Into<String>) -> Self {
        Self::Codec {
            codec,
            code: code.into(),
            message: message.into(),
        }
    }

    /// The [`std::io::ErrorKind`] this error maps to when surfaced through
    /// the standard I/O traits.
    pub fn kind(&self) -> std::io::ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::Finished
            | Self::Poisoned
            | Self::Released
            | Self::Parameter(_) => std::io::ErrorKind::InvalidInput,
            Self::InvalidData { .. } => std::io::ErrorKind::InvalidData,
            Self::OutOfMemory { .. } => std::io::ErrorKind::OutOfMemory,
            Self::Codec { .. } => std::io::ErrorKind::Other,
            Self::Io(err) => err.kind(),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            err => std::io::Error::new(err.kind(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_distinguish_error_classes() {
        let misuse: std::io::Error = Error::Finished.into();
        assert_eq!(misuse.kind(), std::io::ErrorKind::InvalidInput);

        let corrupt: std::io::Error = Error::invalid_data(Codec::Gzip, "bad header").into();
        assert_eq!(corrupt.kind(), std::io::ErrorKind::InvalidData);

        let oom: std::io::Error = Error::OutOfMemory { codec: Codec::Xz }.into();
        assert_eq!(oom.kind(), std::io::ErrorKind::OutOfMemory);

        let native: std::io::Error = Error::codec(Codec::Bzip2, -1, "sequence error").into();
        assert_eq!(native.kind(), std::io::ErrorKind::Other);
    }

    #[test]
    fn io_errors_pass_through_unwrapped() {
        let original = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let converted: std::io::Error = Error::Io(original).into();
        assert_eq!(converted.kind(), std::io::ErrorKind::BrokenPipe);
        assert!(converted.get_ref().is_some_and(|inner| inner.to_string() == "gone"));
    }

    #[test]
    fn round_trip_through_io_error_keeps_variant() {
        let converted: std::io::Error = Error::OutOfMemory { codec: Codec::Bzip2 }.into();
        assert!(matches!(
            Error::from(converted),
            Error::OutOfMemory {
                codec: Codec::Bzip2
            }
        ));

        let plain = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(Error::from(plain), Error::Io(err) if err.kind() == std::io::ErrorKind::TimedOut));
    }

    #[test]
    fn wrapped_error_is_recoverable() {
        let converted: std::io::Error = Error::invalid_data(Codec::Lz4, "bad magic").into();
        let inner = converted
            .into_inner()
            .unwrap()
            .downcast::<Error>()
            .unwrap();
        assert!(matches!(
            *inner,
            Error::InvalidData {
                codec: Codec::Lz4,
                ..
            }
        ));
    }
}
