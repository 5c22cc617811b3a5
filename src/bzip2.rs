//! bzip2 streams over [`bzip2::Compress`](::bzip2::Compress) and
//! [`bzip2::Decompress`](::bzip2::Decompress).

use std::io::{Read as _, Write as _};

use ::bzip2::{Action, Compress, Compression, Decompress, Status};

use crate::{
    buffer::{fill_writable, Buffer},
    codec::{counter_delta, Codec, CodecOutcome, Decode, DecodeStatus, Encode},
    params::{Bzip2Level, Bzip2WorkFactor},
    CodecReader, CodecWriter, Error,
};

pub type Bzip2Writer<W> = CodecWriter<Bzip2Encoder, W>;
pub type Bzip2Reader<R> = CodecReader<Bzip2Decoder, R>;

/// Map a libbz2 error onto [`Error`], keeping the native `BZ_*` code.
fn native_error(err: ::bzip2::Error) -> Error {
    match err {
        ::bzip2::Error::Data | ::bzip2::Error::DataMagic => {
            Error::invalid_data(Codec::Bzip2, err.to_string())
        }
        ::bzip2::Error::Sequence => Error::codec(Codec::Bzip2, -1, err.to_string()),
        ::bzip2::Error::Param => Error::codec(Codec::Bzip2, -2, err.to_string()),
    }
}

fn unexpected_status(action: &str, status: Status) -> Error {
    Error::codec(
        Codec::Bzip2,
        -1,
        format!("unexpected status {status:?} while {action}"),
    )
}

pub struct Bzip2Encoder {
    compress: Compress,
}

impl Bzip2Encoder {
    pub fn new(level: Bzip2Level, work_factor: Bzip2WorkFactor) -> Self {
        Self {
            compress: Compress::new(Compression::new(level.get()), work_factor.get()),
        }
    }

    fn step(
        &mut self,
        input: &[u8],
        out: &mut impl Buffer,
        action: Action,
    ) -> crate::Result<(Status, usize)> {
        let total_in = self.compress.total_in();
        let total_out = self.compress.total_out();

        let (status, _) = fill_writable(out, |window| {
            let status = self
                .compress
                .compress(input, window, action)
                .map_err(native_error)?;
            Ok::<_, Error>((status, counter_delta(self.compress.total_out(), total_out)))
        })?;

        Ok((status, counter_delta(self.compress.total_in(), total_in)))
    }
}

impl Encode for Bzip2Encoder {
    fn codec(&self) -> Codec {
        Codec::Bzip2
    }

    fn encode(&mut self, data: &[u8], out: &mut impl Buffer) -> crate::Result<usize> {
        match self.step(data, out, Action::Run)? {
            (Status::RunOk, consumed) => Ok(consumed),
            (status, _) => Err(unexpected_status("compressing", status)),
        }
    }

    fn flush(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        match self.step(&[], out, Action::Flush)? {
            (Status::FlushOk, _) => Ok(CodecOutcome::HasMore),
            (Status::RunOk, _) => Ok(CodecOutcome::Complete(())),
            (status, _) => Err(unexpected_status("flushing", status)),
        }
    }

    fn finish(&mut self, out: &mut impl Buffer) -> crate::Result<CodecOutcome<()>> {
        match self.step(&[], out, Action::Finish)? {
            (Status::FinishOk, _) => Ok(CodecOutcome::HasMore),
            (Status::StreamEnd, _) => Ok(CodecOutcome::Complete(())),
            (status, _) => Err(unexpected_status("finishing", status)),
        }
    }
}

pub struct Bzip2Decoder {
    decompress: Decompress,
}

impl Bzip2Decoder {
    /// Create a decoder. `small` selects libbz2's slower decompression
    /// mode that uses roughly half the memory.
    pub fn new(small: bool) -> Self {
        Self {
            decompress: Decompress::new(small),
        }
    }
}

impl Decode for Bzip2Decoder {
    fn codec(&self) -> Codec {
        Codec::Bzip2
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
                .decompress(input, window)
                .map_err(native_error)?;
            Ok::<_, Error>((status, counter_delta(self.decompress.total_out(), total_out)))
        })?;

        let consumed = counter_delta(self.decompress.total_in(), total_in);
        match status {
            Status::StreamEnd => Ok(DecodeStatus::Finished(consumed)),
            Status::Ok => Ok(DecodeStatus::Consumed(consumed)),
            Status::MemNeeded => Err(Error::OutOfMemory {
                codec: Codec::Bzip2,
            }),
            status => Err(unexpected_status("decompressing", status)),
        }
    }
}

impl<W> Bzip2Writer<W>
where
    W: std::io::Write,
{
    pub fn builder(writer: W) -> Bzip2WriterBuilder<W> {
        Bzip2WriterBuilder::new(writer)
    }
}

impl<R> Bzip2Reader<std::io::BufReader<R>> {
    pub fn builder(reader: R) -> Bzip2ReaderBuilder<std::io::BufReader<R>>
    where
        R: std::io::Read,
    {
        Bzip2ReaderBuilder::new(std::io::BufReader::with_capacity(
            crate::DEFAULT_BUFFER_SIZE,
            reader,
        ))
    }
}

impl<R> Bzip2Reader<R> {
    pub fn builder_buffered(reader: R) -> Bzip2ReaderBuilder<R> {
        Bzip2ReaderBuilder::new(reader)
    }
}

pub struct Bzip2WriterBuilder<W> {
    writer: W,
    level: Bzip2Level,
    work_factor: Bzip2WorkFactor,
}

impl<W> Bzip2WriterBuilder<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            level: Bzip2Level::default(),
            work_factor: Bzip2WorkFactor::default(),
        }
    }

    pub fn with_level(mut self, level: Bzip2Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_work_factor(mut self, work_factor: Bzip2WorkFactor) -> Self {
        self.work_factor = work_factor;
        self
    }

    pub fn build(self) -> crate::Result<Bzip2Writer<W>>
    where
        W: std::io::Write,
    {
        tracing::debug!(
            level = %self.level,
            work_factor = %self.work_factor,
            "creating bzip2 encoder",
        );
        let encoder = Bzip2Encoder::new(self.level, self.work_factor);
        CodecWriter::new(self.writer, encoder, crate::DEFAULT_BUFFER_SIZE)
    }
}

pub struct Bzip2ReaderBuilder<R> {
    reader: R,
    small: bool,
}

impl<R> Bzip2ReaderBuilder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            small: false,
        }
    }

    /// Use libbz2's low-memory decompression mode.
    pub fn with_small_memory(mut self, small: bool) -> Self {
        self.small = small;
        self
    }

    pub fn build(self) -> crate::Result<Bzip2Reader<R>> {
        Ok(CodecReader::new(self.reader, Bzip2Decoder::new(self.small)))
    }
}

pub fn compress_to_vec(data: &[u8], level: Bzip2Level) -> crate::Result<Vec<u8>> {
    let mut writer = Bzip2Writer::builder(Vec::new()).with_level(level).build()?;
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

pub fn decompress_to_vec(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = Bzip2Reader::builder_buffered(data).build()?;
    let mut decompressed = vec![];
    reader.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
