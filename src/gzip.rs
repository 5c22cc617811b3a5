//! DEFLATE streams in gzip, zlib or raw containers, driven through
//! `flate2`'s low-level [`Compress`](flate2::Compress) and
//! [`Decompress`](flate2::Decompress) state machines.

use std::io::{Read as _, Write as _};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::{
    buffer::{fill_writable, Buffer},
    codec::{counter_delta, Codec, CodecOutcome, Decode, DecodeStatus, Encode},
    params::GzipLevel,
    CodecReader, CodecWriter, Error,
};

const WINDOW_BITS: u8 = 15;

/// zlib's `Z_STREAM_ERROR`, reported when the deflate state is unusable.
const STREAM_ERROR: i64 = -2;

pub type GzipWriter<W> = CodecWriter<GzipEncoder, W>;
pub type GzipReader<R> = CodecReader<GzipDecoder, R>;

/// The container wrapped around the DEFLATE bitstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeflateFormat {
    /// gzip header and CRC-32 trailer.
    #[default]
    Gzip,
    /// zlib header and Adler-32 trailer.
    Zlib,
    /// Bare DEFLATE blocks.
    Raw,
}

pub struct GzipEncoder {
    compress: Compress,
}

impl GzipEncoder {
    pub fn new(level: GzipLevel, format: DeflateFormat) -> Self {
        let level = Compression::new(level.get());
        let compress = match format {
            DeflateFormat::Gzip => Compress::new_gzip(level, WINDOW_BITS),
            DeflateFormat::Zlib => Compress::new(level, true),
            DeflateFormat::Raw => Compress::new(level, false),
        };

        Self { compress }
    }

    /// Run one deflate call. Returns the native status, the number of input
    /// bytes consumed, and whether the output window was left with spare
    /// room.
    fn step(
        &mut self,
        input: &[u8],
        out: &mut impl Buffer,
        flush: FlushCompress,
    ) -> crate::Result<(Status, usize, bool)> {
        let total_in = self.compress.total_in();
        let total_out = self.compress.total_out();

        let ((status, window_len), written) = fill_writable(out, |window| {
            let status = self
                .compress
                .compress(input, window, flush)
                .map_err(|err| Error::codec(Codec::Gzip, STREAM_ERROR, err.to_string()))?;
            let written = counter_delta(self.compress.total_out(), total_out);
            Ok::<_, Error>(((status, window.len()), written))
        })?;

        let consumed = counter_delta(self.compress.total_in(), total_in);
        Ok((status, consumed, written < window_len))
    }
}

impl Encode for GzipEncoder {
    fn codec(&self) -> Codec {
        Codec::Gzip
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        let (_, consumed, _) = self.step(data, out, FlushCompress::None)?;
        Ok(consumed)
    }

    fn flush(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        let (status, _, has_room) = self.step(&[], out, FlushCompress::Sync)?;

        // A sync flush that did not fill the window emitted everything. A
        // repeated flush with nothing new to emit reports `BufError`.
        match status {
            Status::BufError => Ok(CodecOutcome::Complete(())),
            Status::Ok if has_room => Ok(CodecOutcome::Complete(())),
            Status::Ok => Ok(CodecOutcome::HasMore),
            Status::StreamEnd => Err(Error::codec(
                Codec::Gzip,
                STREAM_ERROR,
                "deflate stream ended during a flush",
            )),
        }
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        let total_out = self.compress.total_out();
        let (status, _, _) = self.step(&[], out, FlushCompress::Finish)?;

        match status {
            Status::StreamEnd => Ok(CodecOutcome::Complete(())),
            Status::Ok => Ok(CodecOutcome::HasMore),
            Status::BufError if self.compress.total_out() > total_out => Ok(CodecOutcome::HasMore),
            Status::BufError => Err(Error::codec(
                Codec::Gzip,
                STREAM_ERROR,
                "deflate made no progress while finishing",
            )),
        }
    }
}

pub struct GzipDecoder {
    decompress: Decompress,
}

impl GzipDecoder {
    pub fn new(format: DeflateFormat) -> Self {
        let decompress = match format {
            DeflateFormat::Gzip => Decompress::new_gzip(WINDOW_BITS),
            DeflateFormat::Zlib => Decompress::new(true),
            DeflateFormat::Raw => Decompress::new(false),
        };

        Self { decompress }
    }
}

impl Decode for GzipDecoder {
    fn codec(&self) -> Codec {
        Codec::Gzip
    }

    fn decode(
        &mut self,
        input: &[u8],
        _eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus> {
        let total_in = self.decompress.total_in();
        let total_out = self.decompress.total_out();

        let (status, _) = fill_writable(out, |window| {
            let status = self
                .decompress
                .decompress(input, window, FlushDecompress::None)
                .map_err(|err| Error::invalid_data(Codec::Gzip, err.to_string()))?;
            let written = counter_delta(self.decompress.total_out(), total_out);
            Ok::<_, Error>((status, written))
        })?;

        let consumed = counter_delta(self.decompress.total_in(), total_in);
        match status {
            Status::StreamEnd => Ok(DecodeStatus::Finished(consumed)),
            Status::Ok | Status::BufError => Ok(DecodeStatus::Consumed(consumed)),
        }
    }
}

impl<W> GzipWriter<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> GzipWriterBuilder<W> {
        GzipWriterBuilder::new(writer)
    }
}

impl<R> GzipReader<std::io::BufReader<R>> {
    /// Create a reader that decompresses the stream read from `reader`,
    /// which will be wrapped with an appropriately-sized buffer.
    pub fn builder(reader: R) -> GzipReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        GzipReaderBuilder::new(
            std::io::BufReader::with_capacity(crate::DEFAULT_BUFFER_SIZE, reader),
        )
    }
}

impl<R> GzipReader<R> {
    /// Create a reader that decompresses the stream read from an already
    /// buffered `reader`, using its buffer directly.
    pub fn builder_buffered(reader: R) -> GzipReaderBuilder<R> {
        GzipReaderBuilder::new(reader)
    }
}

pub struct GzipWriterBuilder<W> {
    writer: W,
    level: GzipLevel,
    format: DeflateFormat,
    buffer_size: usize,
}

impl<W> GzipWriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            level: GzipLevel::default(),
            format: DeflateFormat::default(),
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_level(mut self, level: GzipLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: DeflateFormat) -> Self {
        self.format = format;
        self
    }

    /// Size of the buffer compressed output is collected in before being
    /// written to the underlying writer.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn build(self) -> crate::Result<GzipWriter<W>>
    where
        W: std::io::Write,
    {
        if self.buffer_size == 0 {
            return Err(Error::InvalidArgument(
                "buffer size must be greater than 0".into(),
            ));
        }

        tracing::debug!(level = %self.level, format = ?self.format, "creating deflate encoder");
        let encoder = GzipEncoder::new(self.level, self.format);
        CodecWriter::new(self.writer, encoder, self.buffer_size)
    }
}

pub struct GzipReaderBuilder<R> {
    reader: R,
    format: DeflateFormat,
}

impl<R> GzipReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            format: DeflateFormat::default(),
        }
    }

    pub fn with_format(mut self, format: DeflateFormat) -> Self {
        self.format = format;
        self
    }

    pub fn build(self) -> crate::Result<GzipReader<R>> {
        Ok(CodecReader::new(self.reader, GzipDecoder::new(self.format)))
    }
}

/// Compress `data` into a complete gzip stream.
pub fn compress_to_vec(data: &[u8], level: GzipLevel) -> crate::Result<Vec<u8>> {
    let mut writer = GzipWriter::builder(Vec::new()).with_level(level).build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

/// Decompress a complete gzip stream.
pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = GzipReader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
