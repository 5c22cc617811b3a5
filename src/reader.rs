use std::io::BufRead as _;

use crate::{
    buffer::{Buffer as _, FixedBuffer},
    codec::{Decode, DecodeStatus, HeaderStatus},
    Error,
};

/// Lifecycle of a [`CodecReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing has been read from the underlying reader yet.
    Uninitialized,
    /// The codec's stream header has been parsed, but no data has been
    /// decoded yet.
    HeaderParsed,
    /// Decoding is in progress.
    Streaming,
    /// The codec reported the end of the stream. Reads return 0 without
    /// touching the underlying reader.
    Finished,
    /// An earlier read failed; further reads fail too.
    Poisoned,
}

/// A reader that decompresses a stream read from an underlying reader.
///
/// The underlying reader `R` must implement [`std::io::BufRead`], since
/// codecs may consume only part of the input offered to them. Each backend
/// module exposes an alias for its codec, such as
/// [`GzipReader`](crate::gzip::GzipReader), along with a builder: use
/// `builder` to wrap any [`std::io::Read`] with a suitably sized
/// [`std::io::BufReader`], or `builder_buffered` to use an existing
/// buffered reader directly.
///
/// ## Reads
///
/// [`std::io::Read::read`] keeps decoding until the destination is full or
/// the compressed stream ends, so a short read always means the end of the
/// stream. A stream that ends in the middle of a block fails with
/// [`std::io::ErrorKind::InvalidData`] instead of returning partial output.
///
/// Once the end of the compressed stream was reached, any bytes after it
/// are left unread in the underlying reader.
pub struct CodecReader<D, R> {
    reader: R,
    decoder: D,
    state: ReaderState,
    position: u64,
}

impl<D, R> CodecReader<D, R>
where
    D: Decode,
{
    pub fn new(reader: R, decoder: D) -> Self {
        Self {
            reader,
            decoder,
            state: ReaderState::Uninitialized,
            position: 0,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// The number of decompressed bytes returned so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn can_read(&self) -> bool {
        true
    }

    pub fn can_write(&self) -> bool {
        false
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_header(&mut self) -> std::io::Result<()>
    where
        R: std::io::BufRead,
    {
        loop {
            let input = self.reader.fill_buf()?;
            let eof = input.is_empty();

            match self.decoder.decode_header(input, eof)? {
                HeaderStatus::Partial(consumed) => {
                    self.reader.consume(consumed);

                    if eof {
                        return Err(self.truncated("stream ended inside the header").into());
                    }
                }
                HeaderStatus::Parsed(consumed) => {
                    self.reader.consume(consumed);
                    self.state = ReaderState::HeaderParsed;
                    tracing::debug!(codec = %self.decoder.codec(), "parsed stream header");
                    return Ok(());
                }
                HeaderStatus::Empty => {
                    self.state = ReaderState::Finished;
                    tracing::debug!(codec = %self.decoder.codec(), "empty compressed stream");
                    return Ok(());
                }
            }
        }
    }

    fn decode_into(&mut self, buf: &mut [u8]) -> std::io::Result<usize>
    where
        R: std::io::BufRead,
    {
        if self.state == ReaderState::Uninitialized {
            self.read_header()?;
        }
        if self.state == ReaderState::Finished {
            return Ok(0);
        }

        self.state = ReaderState::Streaming;

        let mut out = FixedBuffer::new(buf);
        loop {
            let input = self.reader.fill_buf()?;
            let eof = input.is_empty();
            let input_len = input.len();

            let produced_before = out.uncommitted().len();
            let status = self.decoder.decode(input, eof, &mut out)?;
            let produced = out.uncommitted().len() - produced_before;

            match status {
                DecodeStatus::Finished(consumed) => {
                    self.reader.consume(consumed);
                    self.state = ReaderState::Finished;
                    tracing::debug!(
                        codec = %self.decoder.codec(),
                        position = self.position + out.uncommitted().len() as u64,
                        "reached end of compressed stream",
                    );
                    break;
                }
                DecodeStatus::Consumed(consumed) => {
                    self.reader.consume(consumed);

                    if produced == 0 {
                        if eof {
                            return Err(self.truncated("unexpected end of stream").into());
                        } else if consumed == 0 {
                            return Err(Error::codec(
                                self.decoder.codec(),
                                0,
                                format!("decoder made no progress with {input_len} bytes of input"),
                            )
                            .into());
                        }
                    }
                }
            }

            if out.is_full() {
                break;
            }
        }

        Ok(out.uncommitted().len())
    }

    fn truncated(&self, message: &str) -> Error {
        Error::invalid_data(self.decoder.codec(), message)
    }
}

impl<D, R> std::io::Read for CodecReader<D, R>
where
    D: Decode,
    R: std::io::BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.state {
            ReaderState::Finished => return Ok(0),
            ReaderState::Poisoned => return Err(Error::Poisoned.into()),
            _ => {}
        }

        match self.decode_into(buf) {
            Ok(len) => {
                self.position += len as u64;
                Ok(len)
            }
            Err(err) => {
                self.state = ReaderState::Poisoned;
                Err(err)
            }
        }
    }
}
