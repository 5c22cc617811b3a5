//! XZ container streams over `liblzma`'s stream encoder and decoder.
//!
//! With the `parallel` feature, [`XzWriterBuilder::with_threads`] switches
//! to liblzma's multithreaded encoder, which splits the input into
//! independently compressed blocks.

use std::io::{Read as _, Write as _};

use liblzma::stream::{Action, Check, Filters, Status, Stream, CONCATENATED};

use crate::{
    buffer::{fill_writable, Buffer},
    codec::{counter_delta, Codec, CodecOutcome, Decode, DecodeStatus, Encode},
    lzma::{native_error, LzmaSettings},
    params::{
        LzmaDictionarySize, LzmaLevel, LzmaLiteralContextBits, LzmaLiteralPositionBits,
        LzmaNiceLength, LzmaPositionBits, XzThreads,
    },
    CodecReader, CodecWriter, Error,
};

pub type XzWriter<W> = CodecWriter<XzEncoder, W>;
pub type XzReader<R> = CodecReader<XzDecoder, R>;

/// Integrity check stored in each xz block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XzCheck {
    None,
    Crc32,
    #[default]
    Crc64,
    Sha256,
}

impl From<XzCheck> for Check {
    fn from(check: XzCheck) -> Self {
        match check {
            XzCheck::None => Check::None,
            XzCheck::Crc32 => Check::Crc32,
            XzCheck::Crc64 => Check::Crc64,
            XzCheck::Sha256 => Check::Sha256,
        }
    }
}

/// Run one `lzma_code` call against the writable part of `out`. Returns
/// the status and the number of input bytes consumed.
fn process(
    stream: &mut Stream,
    input: &[u8],
    out: &mut impl Buffer,
    action: Action,
) -> crate::Result<(Status, usize)> {
    let total_in = stream.total_in();
    let total_out = stream.total_out();

    let (status, _) = fill_writable(out, |window| {
        let status = stream
            .process(input, window, action)
            .map_err(|err| native_error(Codec::Xz, err))?;
        Ok::<_, Error>((status, counter_delta(stream.total_out(), total_out)))
    })?;

    Ok((status, counter_delta(stream.total_in(), total_in)))
}

pub struct XzEncoder {
    stream: Stream,
}

impl XzEncoder {
    pub fn new(settings: &LzmaSettings, check: XzCheck) -> crate::Result<Self> {
        let options = settings.options(Codec::Xz)?;
        let stream = Stream::new_stream_encoder(Filters::new().lzma2(&options), check.into())
            .map_err(|err| native_error(Codec::Xz, err))?;

        Ok(Self { stream })
    }

    /// Create a multithreaded encoder. `block_size` of `None` lets liblzma
    /// pick a block size from the dictionary size.
    #[cfg(feature = "parallel")]
    pub fn new_parallel(
        settings: &LzmaSettings,
        check: XzCheck,
        threads: XzThreads,
        block_size: Option<u64>,
    ) -> crate::Result<Self> {
        let options = settings.options(Codec::Xz)?;
        let mut filters = Filters::new();
        filters.lzma2(&options);

        let mut builder = liblzma::stream::MtStreamBuilder::new();
        builder
            .threads(threads.get())
            .filters(filters)
            .check(check.into());
        if let Some(block_size) = block_size {
            builder.block_size(block_size);
        }

        let stream = builder
            .encoder()
            .map_err(|err| native_error(Codec::Xz, err))?;
        Ok(Self { stream })
    }
}

impl Encode for XzEncoder {
    fn codec(&self) -> Codec {
        Codec::Xz
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        let (_, consumed) = process(&mut self.stream, data, out, Action::Run)?;
        Ok(consumed)
    }

    /// xz streams are only flushed when finished.
    fn flush(&mut self, _out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        Ok(CodecOutcome::Complete(()))
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        match process(&mut self.stream, &[], out, Action::Finish)? {
            (Status::StreamEnd, _) => Ok(CodecOutcome::Complete(())),
            _ => Ok(CodecOutcome::HasMore),
        }
    }
}

pub struct XzDecoder {
    stream: Stream,
    concatenated: bool,
}

impl XzDecoder {
    /// Create a decoder. With `concatenated` set, several xz streams
    /// following each other are decoded as one.
    pub fn new(memlimit: u64, concatenated: bool) -> crate::Result<Self> {
        let flags = if concatenated { CONCATENATED } else { 0 };
        let stream = Stream::new_stream_decoder(memlimit, flags)
            .map_err(|err| native_error(Codec::Xz, err))?;

        Ok(Self {
            stream,
            concatenated,
        })
    }
}

impl Decode for XzDecoder {
    fn codec(&self) -> Codec {
        Codec::Xz
    }

    fn decode(
        &mut self,
        input: &[u8],
        eof: bool,
        out: &mut impl Buffer,
    ) -> crate::Result<DecodeStatus> {
        // In concatenated mode the decoder only knows the input is over
        // once it is told to finish.
        let action = if eof && self.concatenated {
            Action::Finish
        } else {
            Action::Run
        };

        match process(&mut self.stream, input, out, action)? {
            (Status::StreamEnd, consumed) => Ok(DecodeStatus::Finished(consumed)),
            (Status::Ok | Status::GetCheck | Status::MemNeeded, consumed) => {
                Ok(DecodeStatus::Consumed(consumed))
            }
        }
    }
}

impl<W> XzWriter<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> XzWriterBuilder<W> {
        XzWriterBuilder::new(writer)
    }
}

impl<R> XzReader<std::io::BufReader<R>> {
    pub fn builder(reader: R) -> XzReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        XzReaderBuilder::new(std::io::BufReader::with_capacity(
            crate::DEFAULT_BUFFER_SIZE,
            reader,
        ))
    }
}

impl<R> XzReader<R> {
    pub fn builder_buffered(reader: R) -> XzReaderBuilder<R> {
        XzReaderBuilder::new(reader)
    }
}

pub struct XzWriterBuilder<W> {
    writer: W,
    settings: LzmaSettings,
    check: XzCheck,
    threads: Option<XzThreads>,
    block_size: Option<u64>,
}

impl<W> XzWriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            settings: LzmaSettings::default(),
            check: XzCheck::default(),
            threads: None,
            block_size: None,
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

    pub fn with_check(mut self, check: XzCheck) -> Self {
        self.check = check;
        self
    }

    /// Compress with the given number of threads. Without the `parallel`
    /// feature, building a writer with more than one thread fails.
    pub fn with_threads(mut self, threads: XzThreads) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Uncompressed size of each block written by the multithreaded
    /// encoder.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn build(self) -> crate::Result<XzWriter<W>>
    where
        W: std::io::Write,
    {
        tracing::debug!(
            settings = ?self.settings,
            check = ?self.check,
            threads = ?self.threads,
            block_size = ?self.block_size,
            "creating xz encoder",
        );

        let encoder = match self.threads {
            None => XzEncoder::new(&self.settings, self.check)?,
            Some(threads) if threads.get() == 1 && self.block_size.is_none() => {
                XzEncoder::new(&self.settings, self.check)?
            }
            #[cfg(feature = "parallel")]
            Some(threads) => {
                XzEncoder::new_parallel(&self.settings, self.check, threads, self.block_size)?
            }
            #[cfg(not(feature = "parallel"))]
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "multithreaded xz compression requires the `parallel` feature".into(),
                ))
            }
        };

        CodecWriter::new(self.writer, encoder, crate::DEFAULT_BUFFER_SIZE)
    }
}

pub struct XzReaderBuilder<R> {
    reader: R,
    memlimit: u64,
    concatenated: bool,
}

impl<R> XzReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            memlimit: u64::MAX,
            concatenated: false,
        }
    }

    /// Fail instead of allocating more than `memlimit` bytes for the
    /// decoder.
    pub fn with_memlimit(mut self, memlimit: u64) -> Self {
        self.memlimit = memlimit;
        self
    }

    /// Decode several xz streams following each other as one stream.
    pub fn with_concatenated(mut self, concatenated: bool) -> Self {
        self.concatenated = concatenated;
        self
    }

    pub fn build(self) -> crate::Result<XzReader<R>> {
        let decoder = XzDecoder::new(self.memlimit, self.concatenated)?;
        Ok(CodecReader::new(self.reader, decoder))
    }
}

pub fn compress_to_vec(data: &[u8], level: LzmaLevel) -> crate::Result<Vec<u8>> {
    let mut writer = XzWriter::builder(Vec::new()).with_level(level).build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = XzReader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
