//! Streaming readers and writers over native compression codecs.
//!
//! Every backend plugs a small codec capability (see [`codec::Encode`] and
//! [`codec::Decode`]) into one of two generic adapters:
//!
//! - [`CodecWriter`] compresses everything written to it and pushes the
//!   compressed bytes into an underlying [`std::io::Write`].
//! - [`CodecReader`] pulls compressed bytes from an underlying
//!   [`std::io::BufRead`] and hands out the decompressed bytes.
//!
//! Supported formats:
//!
//! | Module | Format | Native library |
//! |---|---|---|
//! | [`gzip`] | gzip, zlib and raw DEFLATE | `flate2` |
//! | [`bzip2`](mod@crate::bzip2) | bzip2 | `bzip2` |
//! | [`lz4`](mod@crate::lz4) | LZ4 frame format | `lz4` (LZ4F) |
//! | [`lz4_legacy`] | LZ4 legacy block container | `lz4` (block API) |
//! | [`lzma`] | raw LZMA with a 13 byte properties header | `liblzma` |
//! | [`xz`] | XZ container | `liblzma` |
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::io::{Read as _, Write as _};
//!
//! let mut compressed = vec![];
//! let mut writer = codec_streams::gzip::GzipWriter::builder(&mut compressed).build()?;
//! writer.write_all(b"hello world")?;
//! writer.finish()?;
//!
//! let mut reader = codec_streams::gzip::GzipReader::builder(&compressed[..]).build()?;
//! let mut decompressed = vec![];
//! reader.read_to_end(&mut decompressed)?;
//! assert_eq!(decompressed, b"hello world");
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod buffer;
pub mod bzip2;
pub mod codec;
mod error;
pub mod gzip;
pub mod lz4;
pub mod lz4_legacy;
pub mod lzma;
pub mod params;
pub mod reader;
pub mod writer;
pub mod xz;

pub use self::{
    codec::{Codec, CodecOutcome},
    error::{Error, Result},
    reader::{CodecReader, ReaderState},
    writer::{CodecWriter, WriterState},
};

/// Size of the working buffers used by every backend unless a codec
/// needs a larger worst-case window.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
