//! LZ4 frame format streams, driven through the LZ4F streaming API of the
//! native `liblz4` (as exposed by [`lz4::liblz4`](::lz4::liblz4)).

use std::{
    ffi::CStr,
    io::{Read as _, Write as _},
    ptr,
};

use ::lz4::liblz4::{
    BlockChecksum, BlockMode, BlockSize, ContentChecksum, FrameType, LZ4FCompressionContext,
    LZ4FDecompressionContext, LZ4FFrameInfo, LZ4FPreferences, LZ4F_compressBegin,
    LZ4F_compressBound, LZ4F_compressEnd, LZ4F_compressUpdate, LZ4F_createCompressionContext,
    LZ4F_createDecompressionContext, LZ4F_decompress, LZ4F_flush, LZ4F_freeCompressionContext,
    LZ4F_freeDecompressionContext, LZ4F_getErrorName, LZ4F_isError, LZ4F_VERSION,
};

use crate::{
    buffer::{fill_writable, Buffer},
    codec::{Codec, CodecOutcome, Decode, DecodeStatus, Encode},
    params::Lz4Level,
    CodecReader, CodecWriter, Error,
};

pub use ::lz4::liblz4::BlockSize as Lz4BlockSize;

/// Input is handed to `LZ4F_compressUpdate` in chunks of at most this
/// size, so the output buffer only has to cover the bound of one chunk.
const CHUNK_SIZE: usize = crate::DEFAULT_BUFFER_SIZE;

/// Maximum size of an LZ4 frame header.
const HEADER_SIZE_MAX: usize = 19;

/// `LZ4F_errorCodes::ERROR_allocation_failed`.
const ALLOCATION_FAILED: i64 = 9;

pub type Lz4Writer<W> = CodecWriter<Lz4Encoder, W>;
pub type Lz4Reader<R> = CodecReader<Lz4Decoder, R>;

/// Decode an LZ4F result. Error results are `(size_t)-code`.
fn check(result: usize, invalid_data: bool) -> crate::Result<usize> {
    // SAFETY: `LZ4F_isError` only inspects the value.
    if unsafe { LZ4F_isError(result) } == 0 {
        return Ok(result);
    }

    // SAFETY: liblz4 returns a pointer to a static, NUL-terminated string
    // for every error code.
    let message = unsafe { CStr::from_ptr(LZ4F_getErrorName(result)) }
        .to_string_lossy()
        .into_owned();
    let code = result.wrapping_neg() as i64;

    if code == ALLOCATION_FAILED {
        Err(Error::OutOfMemory { codec: Codec::Lz4 })
    } else if invalid_data {
        Err(Error::invalid_data(Codec::Lz4, message))
    } else {
        Err(Error::codec(Codec::Lz4, code, message))
    }
}

/// Owns an LZ4F compression context and frees it on drop.
struct CompressionContext(LZ4FCompressionContext);

impl CompressionContext {
    fn new() -> crate::Result<Self> {
        let mut context = LZ4FCompressionContext(ptr::null_mut());
        // SAFETY: `context` is a valid out-pointer for the new context.
        check(
            unsafe { LZ4F_createCompressionContext(&mut context, LZ4F_VERSION) },
            false,
        )?;
        Ok(Self(context))
    }
}

impl Drop for CompressionContext {
    fn drop(&mut self) {
        // SAFETY: the context was created by `LZ4F_createCompressionContext`
        // and is freed exactly once.
        unsafe {
            LZ4F_freeCompressionContext(self.0);
        }
    }
}

/// Owns an LZ4F decompression context and frees it on drop.
struct DecompressionContext(LZ4FDecompressionContext);

impl DecompressionContext {
    fn new() -> crate::Result<Self> {
        let mut context = LZ4FDecompressionContext(ptr::null_mut());
        // SAFETY: `context` is a valid out-pointer for the new context.
        check(
            unsafe { LZ4F_createDecompressionContext(&mut context, LZ4F_VERSION) },
            false,
        )?;
        Ok(Self(context))
    }
}

impl Drop for DecompressionContext {
    fn drop(&mut self) {
        // SAFETY: the context was created by
        // `LZ4F_createDecompressionContext` and is freed exactly once.
        unsafe {
            LZ4F_freeDecompressionContext(self.0);
        }
    }
}

/// Compressor for the LZ4 frame format. Blocks are independent and the
/// frame carries a content checksum unless disabled.
pub struct Lz4Encoder {
    context: CompressionContext,
    preferences: LZ4FPreferences,
}

impl Lz4Encoder {
    pub fn new(
        level: Lz4Level,
        block_size: BlockSize,
        content_checksum: bool,
    ) -> crate::Result<Self> {
        let content_checksum_flag = if content_checksum {
            ContentChecksum::ChecksumEnabled
        } else {
            ContentChecksum::NoChecksum
        };

        let preferences = LZ4FPreferences {
            frame_info: LZ4FFrameInfo {
                block_size_id: block_size,
                block_mode: BlockMode::Independent,
                content_checksum_flag,
                frame_type: FrameType::Frame,
                content_size: 0,
                dict_id: 0,
                block_checksum_flag: BlockChecksum::NoBlockChecksum,
            },
            compression_level: level.get(),
            auto_flush: 0,
            favor_dec_speed: 0,
            reserved: [0; 3],
        };

        Ok(Self {
            context: CompressionContext::new()?,
            preferences,
        })
    }

    /// Worst-case output size of compressing `len` bytes, including
    /// anything still buffered in the context and the frame end mark.
    fn bound(&self, len: usize) -> usize {
        // SAFETY: `preferences` outlives the call.
        unsafe { LZ4F_compressBound(len, &self.preferences) }
    }

    /// Output buffer size that lets every step run with a worst-case
    /// window.
    pub fn buffer_size(&self) -> usize {
        self.bound(CHUNK_SIZE).max(HEADER_SIZE_MAX)
    }
}

impl Encode for Lz4Encoder {
    fn codec(&self) -> Codec {
        Codec::Lz4
    }

    fn begin(&mut self, out: &mut impl Buffer) -> crate::Result<()> {
        let context = self.context.0;
        let preferences = &self.preferences;

        fill_writable(out, |window| {
            // SAFETY: `window` is valid for writes of `window.len()` bytes.
            let written = check(
                unsafe {
                    LZ4F_compressBegin(context, window.as_mut_ptr(), window.len(), preferences)
                },
                false,
            )?;
            Ok::<_, Error>(((), written))
        })?;

        Ok(())
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        let chunk = &data[..data.len().min(CHUNK_SIZE)];
        if out.writable().len() < self.bound(chunk.len()) {
            return Ok(0);
        }

        let context = self.context.0;
        fill_writable(out, |window| {
            // SAFETY: `window` holds at least `LZ4F_compressBound` bytes for
            // this chunk, and both slices are valid for their lengths.
            let written = check(
                unsafe {
                    LZ4F_compressUpdate(
                        context,
                        window.as_mut_ptr(),
                        window.len(),
                        chunk.as_ptr(),
                        chunk.len(),
                        ptr::null(),
                    )
                },
                false,
            )?;
            Ok::<_, Error>(((), written))
        })?;

        Ok(chunk.len())
    }

    fn flush(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        if out.writable().len() < self.bound(0) {
            return Ok(CodecOutcome::HasMore);
        }

        let context = self.context.0;
        let (_, written) = fill_writable(out, |window| {
            // SAFETY: `window` is valid for writes of `window.len()` bytes.
            let written = check(
                unsafe { LZ4F_flush(context, window.as_mut_ptr(), window.len(), ptr::null()) },
                false,
            )?;
            Ok::<_, Error>(((), written))
        })?;

        tracing::trace!(written, "flushed lz4 frame block");
        Ok(CodecOutcome::Complete(()))
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        if out.writable().len() < self.bound(0) {
            return Ok(CodecOutcome::HasMore);
        }

        let context = self.context.0;
        fill_writable(out, |window| {
            // SAFETY: `window` is valid for writes of `window.len()` bytes.
            let written = check(
                unsafe {
                    LZ4F_compressEnd(context, window.as_mut_ptr(), window.len(), ptr::null())
                },
                false,
            )?;
            Ok::<_, Error>(((), written))
        })?;

        Ok(CodecOutcome::Complete(()))
    }
}

pub struct Lz4Decoder {
    context: DecompressionContext,
}

impl Lz4Decoder {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            context: DecompressionContext::new()?,
        })
    }
}

impl Decode for Lz4Decoder {
    fn codec(&self) -> Codec {
        Codec::Lz4
    }

    fn decode(
        &mut self,
        input: &[u8],
        _eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus> {
        let context = self.context.0;
        let mut consumed = input.len();

        let (hint, _) = fill_writable(out, |window| {
            let mut written = window.len();
            // SAFETY: both slices are valid for the lengths passed in, and
            // liblz4 writes back how much of each it used.
            let hint = check(
                unsafe {
                    LZ4F_decompress(
                        context,
                        window.as_mut_ptr(),
                        &mut written,
                        input.as_ptr(),
                        &mut consumed,
                        ptr::null(),
                    )
                },
                true,
            )?;
            Ok::<_, Error>((hint, written))
        })?;

        // A zero hint means the frame is complete and fully flushed.
        if hint == 0 {
            Ok(DecodeStatus::Finished(consumed))
        } else {
            Ok(DecodeStatus::Consumed(consumed))
        }
    }
}

impl<W> Lz4Writer<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> Lz4WriterBuilder<W> {
        Lz4WriterBuilder::new(writer)
    }
}

impl<R> Lz4Reader<std::io::BufReader<R>> {
    pub fn builder(reader: R) -> Lz4ReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        Lz4ReaderBuilder::new(std::io::BufReader::with_capacity(
            crate::DEFAULT_BUFFER_SIZE,
            reader,
        ))
    }
}

impl<R> Lz4Reader<R> {
    pub fn builder_buffered(reader: R) -> Lz4ReaderBuilder<R> {
        Lz4ReaderBuilder::new(reader)
    }
}

pub struct Lz4WriterBuilder<W> {
    writer: W,
    level: Lz4Level,
    block_size: BlockSize,
    content_checksum: bool,
}

impl<W> Lz4WriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            level: Lz4Level::default(),
            block_size: BlockSize::Max4MB,
            content_checksum: true,
        }
    }

    pub fn with_level(mut self, level: Lz4Level) -> Self {
        self.level = level;
        self
    }

    /// Maximum uncompressed size of each block in the frame.
    pub fn with_block_size(mut self, block_size: BlockSize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_content_checksum(mut self, content_checksum: bool) -> Self {
        self.content_checksum = content_checksum;
        self
    }

    pub fn build(self) -> crate::Result<Lz4Writer<W>>
    where
        W: std::io::Write,
    {
        tracing::debug!(
            level = %self.level,
            block_size = ?self.block_size,
            content_checksum = self.content_checksum,
            "creating lz4 frame encoder",
        );
        let encoder = Lz4Encoder::new(self.level, self.block_size, self.content_checksum)?;
        let buffer_size = encoder.buffer_size();
        CodecWriter::new(self.writer, encoder, buffer_size)
    }
}

pub struct Lz4ReaderBuilder<R> {
    reader: R,
}

impl<R> Lz4ReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn build(self) -> crate::Result<Lz4Reader<R>> {
        Ok(CodecReader::new(self.reader, Lz4Decoder::new()?))
    }
}

pub fn compress_to_vec(data: &[u8], level: Lz4Level) -> crate::Result<Vec<u8>> {
    let mut writer = Lz4Writer::builder(Vec::new()).with_level(level).build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = Lz4Reader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
