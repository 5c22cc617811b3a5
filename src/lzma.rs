//! Raw LZMA streams with the 13 byte "lzma-alone" header:
//!
//! ```plain
//! | props (1) | dictionary size (LE32) | uncompressed size (LE64) | LZMA data ...
//! ```
//!
//! The properties byte packs the literal context bits `lc`, literal
//! position bits `lp` and position bits `pb` as `(pb * 5 + lp) * 9 + lc`.
//! An uncompressed size of `u64::MAX` means the size is unknown and the
//! data ends with an end marker. With a known size the end marker is
//! optional, and the writer leaves it out unless asked for one.
//!
//! The data is produced and consumed by `liblzma`'s `LZMA_FILTER_LZMA1EXT`
//! raw filter, which takes the uncompressed size and the end marker flag
//! alongside the usual LZMA options.

use std::{
    ffi::c_void,
    io::{Read as _, Write as _},
    mem, ptr,
};

use liblzma::stream::{LzmaOptions, Status};
use liblzma_sys::{
    lzma_action, lzma_filter, lzma_options_lzma, lzma_ret, lzma_stream, LZMA_FINISH, LZMA_RUN,
    LZMA_VLI_UNKNOWN,
};

use crate::{
    buffer::{copy_all_from_slice, fill_writable, Buffer},
    codec::{counter_delta, Codec, CodecOutcome, Decode, DecodeStatus, Encode, HeaderStatus},
    params::{
        LzmaDictionarySize, LzmaLevel, LzmaLiteralContextBits, LzmaLiteralPositionBits,
        LzmaNiceLength, LzmaPositionBits,
    },
    CodecReader, CodecWriter, Error,
};

pub const HEADER_SIZE: usize = 13;

/// Uncompressed size recorded in the header when the size is unknown.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Largest value `lc + lp` may take.
const MAX_LITERAL_BITS: u32 = 4;

/// Dictionary size of each preset level, as chosen by liblzma.
const PRESET_DICTIONARY_SIZES: [u32; 10] = [
    1 << 18,
    1 << 20,
    1 << 21,
    1 << 22,
    1 << 22,
    1 << 23,
    1 << 23,
    1 << 24,
    1 << 25,
    1 << 26,
];

/// `LZMA_FILTER_LZMA1EXT`
const FILTER_LZMA1EXT: liblzma_sys::lzma_vli = 0x4000_0000_0000_0002;

/// `LZMA_LZMA1EXT_ALLOW_EOPM`: the encoder writes an end marker, and the
/// decoder accepts one even when the size is known.
const ALLOW_END_MARKER: u32 = 0x01;

/// `lzma_ret` values reported with [`Error::Codec`].
mod ret {
    pub const MEMLIMIT_ERROR: i64 = 6;
    pub const OPTIONS_ERROR: i64 = 8;
    pub const PROG_ERROR: i64 = 11;
    pub const UNSUPPORTED_CHECK: i64 = 3;
    pub const NO_CHECK: i64 = 2;
}

pub type LzmaWriter<W> = CodecWriter<LzmaEncoder, W>;
pub type LzmaReader<R> = CodecReader<LzmaDecoder, R>;

/// Map a liblzma error onto [`Error`], keeping the native `lzma_ret` code.
#[allow(unreachable_patterns)]
pub(crate) fn native_error(codec: Codec, err: liblzma::stream::Error) -> Error {
    use liblzma::stream::Error as LzmaError;

    match err {
        LzmaError::Data | LzmaError::Format => Error::invalid_data(codec, err.to_string()),
        LzmaError::Mem => Error::OutOfMemory { codec },
        LzmaError::MemLimit => Error::codec(codec, ret::MEMLIMIT_ERROR, err.to_string()),
        LzmaError::Options => Error::codec(codec, ret::OPTIONS_ERROR, err.to_string()),
        LzmaError::NoCheck => Error::codec(codec, ret::NO_CHECK, err.to_string()),
        LzmaError::UnsupportedCheck => {
            Error::codec(codec, ret::UNSUPPORTED_CHECK, err.to_string())
        }
        _ => Error::codec(codec, ret::PROG_ERROR, err.to_string()),
    }
}

/// Classify an `lzma_ret` the way `liblzma::stream::Stream::process` does.
fn check(result: lzma_ret) -> crate::Result<Status> {
    use liblzma::stream::Error as LzmaError;

    let err = match result {
        liblzma_sys::LZMA_OK => return Ok(Status::Ok),
        liblzma_sys::LZMA_STREAM_END => return Ok(Status::StreamEnd),
        liblzma_sys::LZMA_GET_CHECK => return Ok(Status::GetCheck),
        liblzma_sys::LZMA_BUF_ERROR => return Ok(Status::MemNeeded),
        liblzma_sys::LZMA_MEM_ERROR => LzmaError::Mem,
        liblzma_sys::LZMA_MEMLIMIT_ERROR => LzmaError::MemLimit,
        liblzma_sys::LZMA_FORMAT_ERROR => LzmaError::Format,
        liblzma_sys::LZMA_OPTIONS_ERROR => LzmaError::Options,
        liblzma_sys::LZMA_DATA_ERROR => LzmaError::Data,
        _ => LzmaError::Program,
    };
    Err(native_error(Codec::Lzma, err))
}

/// LZMA1 options from a preset, before any overrides.
fn preset_options(level: u32) -> crate::Result<lzma_options_lzma> {
    // SAFETY: all-zero is a valid `lzma_options_lzma` (null preset
    // dictionary), and `lzma_lzma_preset` only writes through the pointer.
    let mut options: lzma_options_lzma = unsafe { mem::zeroed() };
    if unsafe { liblzma_sys::lzma_lzma_preset(&mut options, level) } != 0 {
        return Err(native_error(
            Codec::Lzma,
            liblzma::stream::Error::Options,
        ));
    }

    Ok(options)
}

fn set_extended(options: &mut lzma_options_lzma, size: Option<u64>, end_marker: bool) {
    let size = size.unwrap_or(LZMA_VLI_UNKNOWN);
    options.ext_size_low = size as u32;
    options.ext_size_high = (size >> 32) as u32;
    options.ext_flags = if end_marker { ALLOW_END_MARKER } else { 0 };
}

type RawInit = unsafe extern "C" fn(*mut lzma_stream, *const lzma_filter) -> lzma_ret;

/// Owns a raw LZMA1EXT `lzma_stream` and ends it on drop.
struct RawStream(lzma_stream);

// SAFETY: the stream's state is only touched through `&mut self`, and
// liblzma keeps no thread-local state for it (`liblzma::stream::Stream`
// makes the same promise).
unsafe impl Send for RawStream {}

impl RawStream {
    fn encoder(options: &lzma_options_lzma) -> crate::Result<Self> {
        Self::new(options, liblzma_sys::lzma_raw_encoder)
    }

    fn decoder(options: &lzma_options_lzma) -> crate::Result<Self> {
        Self::new(options, liblzma_sys::lzma_raw_decoder)
    }

    fn new(options: &lzma_options_lzma, init: RawInit) -> crate::Result<Self> {
        let filters = [
            lzma_filter {
                id: FILTER_LZMA1EXT,
                options: options as *const lzma_options_lzma as *mut c_void,
            },
            lzma_filter {
                id: LZMA_VLI_UNKNOWN,
                options: ptr::null_mut(),
            },
        ];

        // SAFETY: an all-zero `lzma_stream` is `LZMA_STREAM_INIT`.
        let mut stream = Self(unsafe { mem::zeroed() });
        // SAFETY: the filter chain is terminated by `LZMA_VLI_UNKNOWN`, and
        // liblzma copies the options it needs during initialization.
        check(unsafe { init(&mut stream.0, filters.as_ptr()) })?;
        Ok(stream)
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        action: lzma_action,
    ) -> crate::Result<Status> {
        self.0.next_in = input.as_ptr();
        self.0.avail_in = input.len();
        self.0.next_out = output.as_mut_ptr();
        self.0.avail_out = output.len();

        // SAFETY: the stream was initialized in `new`, and the in/out
        // pointers cover `input` and `output` for the duration of the call.
        let result = unsafe { liblzma_sys::lzma_code(&mut self.0, action) };

        self.0.next_in = ptr::null();
        self.0.avail_in = 0;
        self.0.next_out = ptr::null_mut();
        self.0.avail_out = 0;

        check(result)
    }

    fn total_in(&self) -> u64 {
        self.0.total_in
    }

    fn total_out(&self) -> u64 {
        self.0.total_out
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        // SAFETY: `lzma_end` accepts both initialized streams and the
        // all-zero stream left behind by a failed initialization.
        unsafe {
            liblzma_sys::lzma_end(&mut self.0);
        }
    }
}

/// Encoder settings shared by raw LZMA and xz streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LzmaSettings {
    pub level: LzmaLevel,
    /// Overrides the preset's dictionary size.
    pub dictionary_size: Option<LzmaDictionarySize>,
    pub literal_context_bits: LzmaLiteralContextBits,
    pub literal_position_bits: LzmaLiteralPositionBits,
    pub position_bits: LzmaPositionBits,
    /// Overrides the preset's nice match length.
    pub nice_length: Option<LzmaNiceLength>,
}

impl LzmaSettings {
    pub fn dictionary_size(&self) -> u32 {
        match self.dictionary_size {
            Some(size) => size.get(),
            None => PRESET_DICTIONARY_SIZES[self.level.get() as usize],
        }
    }

    /// The properties byte stored in the raw LZMA header.
    pub fn properties(&self) -> u8 {
        let lc = self.literal_context_bits.get();
        let lp = self.literal_position_bits.get();
        let pb = self.position_bits.get();

        // At most (4 * 5 + 4) * 9 + 4 = 220.
        ((pb * 5 + lp) * 9 + lc) as u8
    }

    fn check_literal_bits(&self) -> crate::Result<()> {
        let lc = self.literal_context_bits.get();
        let lp = self.literal_position_bits.get();
        if lc + lp > MAX_LITERAL_BITS {
            return Err(Error::InvalidArgument(format!(
                "literal context bits ({lc}) plus literal position bits ({lp}) must not exceed {MAX_LITERAL_BITS}"
            )));
        }

        Ok(())
    }

    /// Options for the LZMA2 filter inside xz streams.
    pub(crate) fn options(&self, codec: Codec) -> crate::Result<LzmaOptions> {
        self.check_literal_bits()?;

        let mut options =
            LzmaOptions::new_preset(self.level.get()).map_err(|err| native_error(codec, err))?;
        options
            .dict_size(self.dictionary_size())
            .literal_context_bits(self.literal_context_bits.get())
            .literal_position_bits(self.literal_position_bits.get())
            .position_bits(self.position_bits.get());
        if let Some(nice_length) = self.nice_length {
            options.nice_len(nice_length.get());
        }

        Ok(options)
    }

    /// Options for a raw LZMA1 stream.
    fn raw_options(&self) -> crate::Result<lzma_options_lzma> {
        self.check_literal_bits()?;

        let mut options = preset_options(self.level.get())?;
        options.dict_size = self.dictionary_size();
        options.lc = self.literal_context_bits.get();
        options.lp = self.literal_position_bits.get();
        options.pb = self.position_bits.get();
        if let Some(nice_length) = self.nice_length {
            options.nice_len = nice_length.get();
        }

        Ok(options)
    }
}

/// The fixed-size header in front of raw LZMA data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaHeader {
    pub literal_context_bits: u32,
    pub literal_position_bits: u32,
    pub position_bits: u32,
    pub dictionary_size: u32,
    /// `None` if the header records [`UNKNOWN_SIZE`].
    pub uncompressed_size: Option<u64>,
}

impl LzmaHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let properties = (self.position_bits * 5 + self.literal_position_bits) * 9
            + self.literal_context_bits;

        let mut bytes = [0; HEADER_SIZE];
        bytes[0] = properties as u8;
        bytes[1..5].copy_from_slice(&self.dictionary_size.to_le_bytes());
        bytes[5..].copy_from_slice(&self.uncompressed_size.unwrap_or(UNKNOWN_SIZE).to_le_bytes());
        bytes
    }

    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> crate::Result<Self> {
        let mut properties = u32::from(bytes[0]);
        if properties >= 9 * 5 * 5 {
            return Err(Error::invalid_data(
                Codec::Lzma,
                format!("invalid properties byte {properties:#04x}"),
            ));
        }

        let literal_context_bits = properties % 9;
        properties /= 9;
        let literal_position_bits = properties % 5;
        let position_bits = properties / 5;

        if literal_context_bits + literal_position_bits > MAX_LITERAL_BITS {
            return Err(Error::invalid_data(
                Codec::Lzma,
                format!(
                    "unsupported literal bits lc={literal_context_bits} lp={literal_position_bits}"
                ),
            ));
        }

        let mut dictionary_size = [0; 4];
        dictionary_size.copy_from_slice(&bytes[1..5]);
        let mut uncompressed_size = [0; 8];
        uncompressed_size.copy_from_slice(&bytes[5..]);
        let uncompressed_size = u64::from_le_bytes(uncompressed_size);

        Ok(Self {
            literal_context_bits,
            literal_position_bits,
            position_bits,
            dictionary_size: u32::from_le_bytes(dictionary_size),
            uncompressed_size: (uncompressed_size != UNKNOWN_SIZE).then_some(uncompressed_size),
        })
    }
}

pub struct LzmaEncoder {
    stream: RawStream,
    header: LzmaHeader,
}

impl LzmaEncoder {
    /// Create an encoder. `content_size` is recorded in the header, and
    /// the stream fails to finish if a different number of bytes was
    /// written. Without a content size the end marker is always written.
    pub fn new(
        settings: &LzmaSettings,
        content_size: Option<u64>,
        end_marker: bool,
    ) -> crate::Result<Self> {
        let mut options = settings.raw_options()?;
        set_extended(
            &mut options,
            content_size,
            end_marker || content_size.is_none(),
        );
        let stream = RawStream::encoder(&options)?;

        Ok(Self {
            stream,
            header: LzmaHeader {
                literal_context_bits: settings.literal_context_bits.get(),
                literal_position_bits: settings.literal_position_bits.get(),
                position_bits: settings.position_bits.get(),
                dictionary_size: settings.dictionary_size(),
                uncompressed_size: content_size,
            },
        })
    }

    pub fn header(&self) -> &LzmaHeader {
        &self.header
    }

    fn step(
        &mut self,
        input: &[u8],
        out: &mut impl Buffer,
        action: lzma_action,
    ) -> crate::Result<(Status, usize)> {
        let stream = &mut self.stream;
        let total_in = stream.total_in();
        let total_out = stream.total_out();

        let (status, _) = fill_writable(out, |window| {
            let status = stream.process(input, window, action)?;
            Ok::<_, Error>((status, counter_delta(stream.total_out(), total_out)))
        })?;

        Ok((status, counter_delta(stream.total_in(), total_in)))
    }
}

impl Encode for LzmaEncoder {
    fn codec(&self) -> Codec {
        Codec::Lzma
    }

    fn begin(&mut self, out: &mut impl Buffer) -> crate::Result<()> {
        copy_all_from_slice(&self.header.to_bytes(), out);
        Ok(())
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        if let Some(content_size) = self.header.uncompressed_size {
            let total = self.stream.total_in() + data.len() as u64;
            if total > content_size {
                return Err(Error::InvalidArgument(format!(
                    "wrote {total} bytes to a stream declared as {content_size} bytes"
                )));
            }
        }

        let (_, consumed) = self.step(data, out, LZMA_RUN)?;
        Ok(consumed)
    }

    /// Raw LZMA has no flush point; everything is written on finish.
    fn flush(&mut self, _out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        Ok(CodecOutcome::Complete(()))
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        if let Some(content_size) = self.header.uncompressed_size {
            let total = self.stream.total_in();
            if total != content_size {
                return Err(Error::InvalidArgument(format!(
                    "wrote {total} bytes to a stream declared as {content_size} bytes"
                )));
            }
        }

        match self.step(&[], out, LZMA_FINISH)? {
            (Status::StreamEnd, _) => Ok(CodecOutcome::Complete(())),
            _ => Ok(CodecOutcome::HasMore),
        }
    }
}

pub struct LzmaDecoder {
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    stream: Option<RawStream>,
    /// The size declared by the header, once parsed.
    declared_size: Option<u64>,
}

impl LzmaDecoder {
    pub fn new() -> Self {
        Self {
            header: [0; HEADER_SIZE],
            header_filled: 0,
            stream: None,
            declared_size: None,
        }
    }
}

impl Default for LzmaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for LzmaDecoder {
    fn codec(&self) -> Codec {
        Codec::Lzma
    }

    fn decode_header(&mut self, input: &[u8], eof: bool) -> crate::Result<HeaderStatus> {
        if eof {
            return Err(Error::invalid_data(
                Codec::Lzma,
                "stream ended inside the header",
            ));
        }

        let take = input.len().min(HEADER_SIZE - self.header_filled);
        self.header[self.header_filled..self.header_filled + take].copy_from_slice(&input[..take]);
        self.header_filled += take;

        if self.header_filled < HEADER_SIZE {
            return Ok(HeaderStatus::Partial(take));
        }

        let header = LzmaHeader::parse(&self.header)?;
        tracing::debug!(?header, "parsed lzma header");

        // Without a declared size the end marker is required; with one it
        // may or may not be present.
        let mut options = preset_options(LzmaLevel::default().get())?;
        options.dict_size = header.dictionary_size.max(LzmaDictionarySize::MIN.get());
        options.lc = header.literal_context_bits;
        options.lp = header.literal_position_bits;
        options.pb = header.position_bits;
        set_extended(&mut options, header.uncompressed_size, true);

        self.stream = Some(RawStream::decoder(&options)?);
        self.declared_size = header.uncompressed_size;

        Ok(HeaderStatus::Parsed(take))
    }

    fn decode(
        &mut self,
        input: &[u8],
        _eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            Error::codec(
                Codec::Lzma,
                ret::PROG_ERROR,
                "decoding before the header was parsed",
            )
        })?;

        let total_in = stream.total_in();
        let total_out = stream.total_out();
        let (status, _) = fill_writable(out, |window| {
            let status = stream.process(input, window, LZMA_RUN)?;
            Ok::<_, Error>((status, counter_delta(stream.total_out(), total_out)))
        })?;
        let consumed = counter_delta(stream.total_in(), total_in);

        match status {
            Status::StreamEnd => match self.declared_size {
                Some(size) if size != stream.total_out() => Err(Error::invalid_data(
                    Codec::Lzma,
                    format!(
                        "stream ended after {} of its declared {size} bytes",
                        stream.total_out()
                    ),
                )),
                _ => Ok(DecodeStatus::Finished(consumed)),
            },
            Status::Ok | Status::GetCheck | Status::MemNeeded => {
                Ok(DecodeStatus::Consumed(consumed))
            }
        }
    }
}

impl<W> LzmaWriter<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> LzmaWriterBuilder<W> {
        LzmaWriterBuilder::new(writer)
    }
}

impl<R> LzmaReader<std::io::BufReader<R>> {
    pub fn builder(reader: R) -> LzmaReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        LzmaReaderBuilder::new(std::io::BufReader::with_capacity(
            crate::DEFAULT_BUFFER_SIZE,
            reader,
        ))
    }
}

impl<R> LzmaReader<R> {
    pub fn builder_buffered(reader: R) -> LzmaReaderBuilder<R> {
        LzmaReaderBuilder::new(reader)
    }
}

pub struct LzmaWriterBuilder<W> {
    writer: W,
    settings: LzmaSettings,
    content_size: Option<u64>,
    end_marker: bool,
}

impl<W> LzmaWriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            settings: LzmaSettings::default(),
            content_size: None,
            end_marker: false,
        }
    }

    pub fn with_level(mut self, level: LzmaLevel) -> Self {
        self.settings.level = level;
        self
    }

    pub fn with_dictionary_size(mut self, size: LzmaDictionarySize) -> Self {
        self.settings.dictionary_size = Some(size);
        self
    }

    pub fn with_literal_context_bits(mut self, bits: LzmaLiteralContextBits) -> Self {
        self.settings.literal_context_bits = bits;
        self
    }

    pub fn with_literal_position_bits(mut self, bits: LzmaLiteralPositionBits) -> Self {
        self.settings.literal_position_bits = bits;
        self
    }

    pub fn with_position_bits(mut self, bits: LzmaPositionBits) -> Self {
        self.settings.position_bits = bits;
        self
    }

    pub fn with_nice_length(mut self, length: LzmaNiceLength) -> Self {
        self.settings.nice_length = Some(length);
        self
    }

    pub fn with_settings(mut self, settings: LzmaSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Record the number of bytes that will be written in the header.
    /// Finishing the stream fails if a different amount was written.
    pub fn with_content_size(mut self, size: u64) -> Self {
        self.content_size = (size != UNKNOWN_SIZE).then_some(size);
        self
    }

    /// Terminate the data with an end marker even though the header
    /// records its size. Streams of unknown size always get one.
    pub fn with_end_marker(mut self, end_marker: bool) -> Self {
        self.end_marker = end_marker;
        self
    }

    pub fn build(self) -> crate::Result<LzmaWriter<W>>
    where
        W: std::io::Write,
    {
        tracing::debug!(
            settings = ?self.settings,
            content_size = ?self.content_size,
            end_marker = self.end_marker,
            "creating lzma encoder",
        );
        let encoder = LzmaEncoder::new(&self.settings, self.content_size, self.end_marker)?;
        CodecWriter::new(self.writer, encoder, crate::DEFAULT_BUFFER_SIZE)
    }
}

pub struct LzmaReaderBuilder<R> {
    reader: R,
}

impl<R> LzmaReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn build(self) -> crate::Result<LzmaReader<R>> {
        Ok(CodecReader::new(self.reader, LzmaDecoder::new()))
    }
}

/// Compress `data` into a raw LZMA stream whose header records its size.
pub fn compress_to_vec(data: &[u8], level: LzmaLevel) -> crate::Result<Vec<u8>> {
    let mut writer = LzmaWriter::builder(Vec::new())
        .with_level(level)
        .with_content_size(data.len() as u64)
        .build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = LzmaReader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
