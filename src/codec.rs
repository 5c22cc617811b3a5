//! The codec capability shared by every backend.
//!
//! A backend only knows how to run one step of its native library against
//! an input slice and an output [`Buffer`], and how to classify the native
//! result code of that step. The loops that drive those steps against real
//! streams live in [`crate::reader`] and [`crate::writer`].

use crate::buffer::Buffer;

/// The result of a step that may need to be repeated because the output
/// buffer ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOutcome<T> {
    Complete(T),
    HasMore,
}

/// The result of one decode step. Both variants carry the number of input
/// bytes the codec consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The stream continues; call again with more input or more output room.
    Consumed(usize),
    /// The codec reached the logical end of the stream. It must not be
    /// called again.
    Finished(usize),
}

/// The result of feeding bytes to a codec-specific stream header parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// Consumed some bytes but the header is not complete yet.
    Partial(usize),
    /// The header is complete.
    Parsed(usize),
    /// The input ended before any header byte, which the codec treats as
    /// a valid empty stream.
    Empty,
}

/// Identifies a backend in errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    Bzip2,
    Lz4,
    Lz4Legacy,
    Lzma,
    Xz,
}

impl Codec {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Lz4 => "lz4",
            Self::Lz4Legacy => "lz4-legacy",
            Self::Lzma => "lzma",
            Self::Xz => "xz",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The compression half of a codec.
///
/// Every method writes into `out` and must leave already-written bytes in
/// place; the caller commits them to the underlying stream between calls.
pub trait Encode {
    fn codec(&self) -> Codec;

    /// Emit any bytes the format requires before the first block, such as
    /// a frame header or magic number. Called once when the writer is
    /// built.
    fn begin(&mut self, _out: &mut impl Buffer) -> crate::Result<()> {
        Ok(())
    }

    /// Compress some prefix of `data`, returning how many bytes were
    /// consumed. Given an empty `out`, an implementation must either
    /// consume input or produce output.
    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize>;

    /// Push out anything buffered inside the codec without ending the
    /// stream. Returns [`CodecOutcome::HasMore`] while the codec still
    /// holds data that did not fit into `out`.
    fn flush(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>>;

    /// End the stream, producing its trailer. Returns
    /// [`CodecOutcome::HasMore`] until the trailer was fully produced.
    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>>;
}

/// The decompression half of a codec.
pub trait Decode {
    fn codec(&self) -> Codec;

    /// Parse a header that has to be seen before the first decode step.
    /// `eof` is set when `input` is empty because the underlying stream
    /// has ended. Codecs without such a header keep the default.
    fn decode_header(&mut self, _input: &[u8], _eof: bool) -> crate::Result<HeaderStatus> {
        Ok(HeaderStatus::Parsed(0))
    }

    /// Decompress some prefix of `input` into `out`. `eof` is set when
    /// `input` is empty because the underlying stream has ended; the codec
    /// may still drain pending output, but must report
    /// [`DecodeStatus::Finished`] or fail if the stream cannot continue.
    fn decode(
        &mut self,
        input: &[u8],
        eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus>;
}

/// Convert a native byte counter delta into a `usize`.
pub(crate) fn counter_delta(after: u64, before: u64) -> usize {
    usize::try_from(after - before).unwrap_or(usize::MAX)
}
