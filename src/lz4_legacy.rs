//! The LZ4 legacy container: a little-endian magic number followed by
//! blocks of up to 8 MiB of uncompressed data, each prefixed with its
//! compressed length as a little-endian `u32`.
//!
//! ```plain
//! | 02 21 4C 18 | len (LE32) | block ... | len (LE32) | block ... | ...
//! ```
//!
//! Blocks are compressed independently with the LZ4 block API
//! ([`lz4::block`](::lz4::block)). A zero length or the end of the input at
//! a block boundary ends the stream. Another magic number in place of a
//! block length starts a concatenated stream, which is decoded as part of
//! the same stream.

use std::io::{Read as _, Write as _};

use ::lz4::block::{compress_bound, compress_to_buffer, decompress_to_buffer, CompressionMode};

use crate::{
    buffer::{copy_all_from_slice, copy_from_slice, fill_writable, move_buffer, Buffer, FixedBuffer},
    codec::{Codec, CodecOutcome, Decode, DecodeStatus, Encode, HeaderStatus},
    params::Lz4Level,
    CodecReader, CodecWriter, Error,
};

pub const MAGIC: u32 = 0x184C_2102;

/// Uncompressed size of every block except the last one.
pub const BLOCK_SIZE: usize = 8 * 1024 * 1024;

const LENGTH_SIZE: usize = 4;

/// Levels below this use the fast compressor.
const HIGH_COMPRESSION_LEVEL: u32 = 3;

pub type Lz4LegacyWriter<W> = CodecWriter<Lz4LegacyEncoder, W>;
pub type Lz4LegacyReader<R> = CodecReader<Lz4LegacyDecoder, R>;

fn max_compressed_block_size() -> crate::Result<usize> {
    compress_bound(BLOCK_SIZE).map_err(|err| Error::codec(Codec::Lz4Legacy, 0, err.to_string()))
}

pub struct Lz4LegacyEncoder {
    level: Lz4Level,
    block: FixedBuffer<Vec<u8>>,
}

impl Lz4LegacyEncoder {
    pub fn new(level: Lz4Level) -> Self {
        Self {
            level,
            block: FixedBuffer::with_capacity(BLOCK_SIZE),
        }
    }

    /// Output buffer size that can hold one full compressed block with
    /// its length prefix.
    pub fn buffer_size() -> crate::Result<usize> {
        Ok(max_compressed_block_size()? + LENGTH_SIZE)
    }

    fn mode(&self) -> CompressionMode {
        if self.level.get() < HIGH_COMPRESSION_LEVEL {
            CompressionMode::DEFAULT
        } else {
            CompressionMode::HIGHCOMPRESSION(self.level.get() as i32)
        }
    }

    /// Compress the pending block, if any, into `out`.
    fn write_block(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        let block = self.block.uncommitted();
        if block.is_empty() {
            return Ok(CodecOutcome::Complete(()));
        }

        let bound = compress_bound(block.len())
            .map_err(|err| Error::codec(Codec::Lz4Legacy, 0, err.to_string()))?;
        if out.writable().len() < bound + LENGTH_SIZE {
            return Ok(CodecOutcome::HasMore);
        }

        let mode = self.mode();
        let (compressed_len, _) = fill_writable(out, |window| {
            let (length, body) = window.split_at_mut(LENGTH_SIZE);
            let compressed_len = compress_to_buffer(block, Some(mode), false, body)
                .map_err(|err| Error::codec(Codec::Lz4Legacy, 0, err.to_string()))?;

            let prefix = u32::try_from(compressed_len)
                .map_err(|_| Error::codec(Codec::Lz4Legacy, 0, "compressed block too large"))?;
            length.copy_from_slice(&prefix.to_le_bytes());

            Ok::<_, Error>((compressed_len, compressed_len + LENGTH_SIZE))
        })?;

        tracing::trace!(
            uncompressed_len = block.len(),
            compressed_len,
            "wrote lz4 legacy block"
        );

        self.block.clear();
        Ok(CodecOutcome::Complete(()))
    }
}

impl Encode for Lz4LegacyEncoder {
    fn codec(&self) -> Codec {
        Codec::Lz4Legacy
    }

    fn begin(&mut self, out: &mut impl Buffer) -> crate::Result<()> {
        copy_all_from_slice(&MAGIC.to_le_bytes(), out);
        Ok(())
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        if self.block.is_full() {
            if let CodecOutcome::HasMore = self.write_block(out)? {
                return Ok(0);
            }
        }

        let copied = copy_from_slice(data, &mut self.block);
        if self.block.is_full() {
            // Without room left in `out`, the full block is written by the
            // next call instead.
            self.write_block(out)?;
        }

        Ok(copied)
    }

    fn flush(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        self.write_block(out)
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        self.write_block(out)
    }
}

/// Decompress one block into `decoded`, replacing its previous contents.
fn decompress_block(block: &[u8], decoded: &mut FixedBuffer<Vec<u8>>) -> crate::Result<()> {
    decoded.clear();
    let (_, decoded_len) = fill_writable(decoded, |window| {
        let capacity = i32::try_from(window.len()).unwrap_or(i32::MAX);
        let decoded_len = decompress_to_buffer(block, Some(capacity), window)
            .map_err(|err| Error::invalid_data(Codec::Lz4Legacy, err.to_string()))?;
        Ok::<_, Error>(((), decoded_len))
    })?;

    tracing::trace!(
        compressed_len = block.len(),
        decoded_len,
        "decoded lz4 legacy block"
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Reading a block length prefix.
    Length { bytes: [u8; LENGTH_SIZE], filled: usize },
    /// Collecting a compressed block of `len` bytes.
    Block { len: usize },
    /// Handing out a decompressed block.
    Draining,
}

impl DecoderState {
    const fn start() -> Self {
        Self::Length {
            bytes: [0; LENGTH_SIZE],
            filled: 0,
        }
    }
}

pub struct Lz4LegacyDecoder {
    magic: [u8; LENGTH_SIZE],
    magic_filled: usize,
    state: DecoderState,
    compressed: FixedBuffer<Vec<u8>>,
    decoded: FixedBuffer<Vec<u8>>,
}

impl Lz4LegacyDecoder {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            magic: [0; LENGTH_SIZE],
            magic_filled: 0,
            state: DecoderState::start(),
            compressed: FixedBuffer::with_capacity(max_compressed_block_size()?),
            decoded: FixedBuffer::with_capacity(BLOCK_SIZE),
        })
    }
}

impl Decode for Lz4LegacyDecoder {
    fn codec(&self) -> Codec {
        Codec::Lz4Legacy
    }

    fn decode_header(&mut self, input: &[u8], eof: bool) -> crate::Result<HeaderStatus> {
        if eof {
            return if self.magic_filled == 0 {
                Ok(HeaderStatus::Empty)
            } else {
                Err(Error::invalid_data(
                    Codec::Lz4Legacy,
                    "stream ended inside the magic number",
                ))
            };
        }

        let take = input.len().min(LENGTH_SIZE - self.magic_filled);
        self.magic[self.magic_filled..self.magic_filled + take].copy_from_slice(&input[..take]);
        self.magic_filled += take;

        if self.magic_filled < LENGTH_SIZE {
            return Ok(HeaderStatus::Partial(take));
        }

        let magic = u32::from_le_bytes(self.magic);
        if magic != MAGIC {
            return Err(Error::invalid_data(
                Codec::Lz4Legacy,
                format!("invalid magic number {magic:#010x}"),
            ));
        }

        Ok(HeaderStatus::Parsed(take))
    }

    fn decode(
        &mut self,
        input: &[u8],
        eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus> {
        let mut consumed = 0;

        loop {
            let remaining = &input[consumed..];

            match self.state {
                DecoderState::Draining => {
                    if let CodecOutcome::HasMore = move_buffer(&mut self.decoded, out) {
                        return Ok(DecodeStatus::Consumed(consumed));
                    }
                    self.state = DecoderState::start();
                }
                DecoderState::Length { mut bytes, mut filled } => {
                    if remaining.is_empty() {
                        return match (eof, filled) {
                            (true, 0) => Ok(DecodeStatus::Finished(consumed)),
                            (true, _) => Err(Error::invalid_data(
                                Codec::Lz4Legacy,
                                "stream ended inside a block length",
                            )),
                            (false, _) => Ok(DecodeStatus::Consumed(consumed)),
                        };
                    }

                    let take = remaining.len().min(LENGTH_SIZE - filled);
                    bytes[filled..filled + take].copy_from_slice(&remaining[..take]);
                    filled += take;
                    consumed += take;

                    if filled < LENGTH_SIZE {
                        self.state = DecoderState::Length { bytes, filled };
                        continue;
                    }

                    let len = u32::from_le_bytes(bytes);
                    if len == 0 {
                        self.state = DecoderState::start();
                        return Ok(DecodeStatus::Finished(consumed));
                    } else if len == MAGIC {
                        tracing::debug!("found concatenated lz4 legacy stream");
                        self.state = DecoderState::start();
                        continue;
                    }

                    let len = len as usize;
                    if len > self.compressed.capacity() {
                        return Err(Error::invalid_data(
                            Codec::Lz4Legacy,
                            format!("block length {len} exceeds the maximum block size"),
                        ));
                    }
                    self.state = DecoderState::Block { len };
                }
                DecoderState::Block { len } => {
                    let collected = self.compressed.uncommitted().len();

                    if collected == 0 && remaining.len() >= len {
                        decompress_block(&remaining[..len], &mut self.decoded)?;
                        consumed += len;
                        self.state = DecoderState::Draining;
                        continue;
                    }

                    if remaining.is_empty() {
                        if eof {
                            return Err(Error::invalid_data(
                                Codec::Lz4Legacy,
                                "stream ended inside a block",
                            ));
                        }
                        return Ok(DecodeStatus::Consumed(consumed));
                    }

                    let take = remaining.len().min(len - collected);
                    copy_all_from_slice(&remaining[..take], &mut self.compressed);
                    consumed += take;

                    if collected + take == len {
                        let result =
                            decompress_block(self.compressed.uncommitted(), &mut self.decoded);
                        self.compressed.clear();
                        result?;

                        self.state = DecoderState::Draining;
                    }
                }
            }
        }
    }
}

impl<W> Lz4LegacyWriter<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> Lz4LegacyWriterBuilder<W> {
        Lz4LegacyWriterBuilder::new(writer)
    }
}

impl<R> Lz4LegacyReader<std::io::BufReader<R>> {
    pub fn builder(reader: R) -> Lz4LegacyReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        Lz4LegacyReaderBuilder::new(std::io::BufReader::with_capacity(
            crate::DEFAULT_BUFFER_SIZE,
            reader,
        ))
    }
}

impl<R> Lz4LegacyReader<R> {
    pub fn builder_buffered(reader: R) -> Lz4LegacyReaderBuilder<R> {
        Lz4LegacyReaderBuilder::new(reader)
    }
}

pub struct Lz4LegacyWriterBuilder<W> {
    writer: W,
    level: Lz4Level,
}

impl<W> Lz4LegacyWriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            level: Lz4Level::default(),
        }
    }

    pub fn with_level(mut self, level: Lz4Level) -> Self {
        self.level = level;
        self
    }

    pub fn build(self) -> crate::Result<Lz4LegacyWriter<W>>
    where
        W: std::io::Write,
    {
        tracing::debug!(level = %self.level, "creating lz4 legacy encoder");
        let buffer_size = Lz4LegacyEncoder::buffer_size()?;
        CodecWriter::new(self.writer, Lz4LegacyEncoder::new(self.level), buffer_size)
    }
}

pub struct Lz4LegacyReaderBuilder<R> {
    reader: R,
}

impl<R> Lz4LegacyReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn build(self) -> crate::Result<Lz4LegacyReader<R>> {
        Ok(CodecReader::new(self.reader, Lz4LegacyDecoder::new()?))
    }
}

pub fn compress_to_vec(data: &[u8], level: Lz4Level) -> crate::Result<Vec<u8>> {
    let mut writer = Lz4LegacyWriter::builder(Vec::new())
        .with_level(level)
        .build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = Lz4LegacyReader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
