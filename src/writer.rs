use std::io::Write as _;

use crate::{
    buffer::{Buffer as _, FixedBuffer},
    codec::{CodecOutcome, Encode},
    Error,
};

/// Lifecycle of a [`CodecWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting writes.
    Open,
    /// The trailer has been written. Further writes fail.
    Finished,
    /// An earlier call failed; the stream is in an unknown state and can
    /// only be dropped.
    Poisoned,
}

/// A writer that compresses everything written to it and writes the
/// compressed stream to an underlying writer.
///
/// Each backend module exposes an alias for its codec, such as
/// [`GzipWriter`](crate::gzip::GzipWriter), along with a builder.
///
/// ## Finishing
///
/// The compressed stream has to be terminated with a codec-specific
/// trailer. Call [`CodecWriter::finish`] (or [`CodecWriter::try_finish`])
/// to write it and observe errors. Dropping an unfinished writer finishes
/// the stream on a best-effort basis, but any error is only logged.
///
/// [`std::io::Write::flush`] pushes out everything the codec has buffered
/// so far without ending the stream, so a decoder reading the output can
/// decode all data written up to the flush.
///
/// ## Ownership of the underlying writer
///
/// The writer is owned by the adapter: it is dropped together with the
/// adapter, or returned by [`CodecWriter::finish`]. To keep using a writer
/// afterwards, pass a mutable reference instead.
pub struct CodecWriter<E, W>
where
    E: Encode,
    W: std::io::Write,
{
    writer: Option<W>,
    encoder: E,
    buffer: FixedBuffer<Vec<u8>>,
    state: WriterState,
    position: u64,
}

impl<E, W> CodecWriter<E, W>
where
    E: Encode,
    W: std::io::Write,
{
    /// Wrap `writer` with the given encoder, using an output buffer of
    /// `buffer_size` bytes. Any header the codec emits up front is written
    /// immediately.
    pub fn new(writer: W, mut encoder: E, buffer_size: usize) -> crate::Result<Self> {
        let mut buffer = FixedBuffer::with_capacity(buffer_size);
        encoder.begin(&mut buffer)?;

        let mut this = Self {
            writer: Some(writer),
            encoder,
            buffer,
            state: WriterState::Open,
            position: 0,
        };
        let flushed = this.flush_uncommitted();
        this.track(flushed)?;

        tracing::debug!(codec = %this.encoder.codec(), buffer_size, "opened compressed stream");

        Ok(this)
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The number of uncompressed bytes accepted so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn can_read(&self) -> bool {
        false
    }

    pub fn can_write(&self) -> bool {
        self.state == WriterState::Open
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Write the stream trailer and flush the underlying writer. Does
    /// nothing if the stream was already finished.
    pub fn try_finish(&mut self) -> std::io::Result<()> {
        match self.state {
            WriterState::Open => {}
            WriterState::Finished => return Ok(()),
            WriterState::Poisoned => return Err(Error::Poisoned.into()),
        }

        let result = self.finish_stream();
        self.track(result)?;

        self.state = WriterState::Finished;
        tracing::debug!(
            codec = %self.encoder.codec(),
            position = self.position,
            "finished compressed stream",
        );

        Ok(())
    }

    /// Finish the stream and return the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.try_finish()?;
        self.writer.take().ok_or_else(|| Error::Released.into())
    }

    fn finish_stream(&mut self) -> std::io::Result<()> {
        loop {
            self.flush_uncommitted()?;

            match self.encoder.finish(&mut self.buffer)? {
                CodecOutcome::HasMore => {}
                CodecOutcome::Complete(()) => break,
            }
        }

        self.flush_uncommitted()?;
        self.inner_mut()?.flush()
    }

    fn write_data(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut consumed = 0;
        while consumed < data.len() {
            self.flush_uncommitted()?;

            let encoded = self.encoder.encode(&data[consumed..], &mut self.buffer)?;
            if encoded == 0 && self.buffer.uncommitted().is_empty() {
                return Err(Error::codec(
                    self.encoder.codec(),
                    0,
                    "encoder made no progress",
                )
                .into());
            }

            consumed += encoded;
        }

        self.flush_uncommitted()
    }

    fn flush_stream(&mut self) -> std::io::Result<()> {
        loop {
            self.flush_uncommitted()?;

            match self.encoder.flush(&mut self.buffer)? {
                CodecOutcome::HasMore => {}
                CodecOutcome::Complete(()) => break,
            }
        }

        self.flush_uncommitted()?;
        self.inner_mut()?.flush()
    }

    fn flush_uncommitted(&mut self) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::Released)?;

        loop {
            let uncommitted = self.buffer.uncommitted();
            if uncommitted.is_empty() {
                return Ok(());
            }

            let committed = writer.write(uncommitted)?;
            self.buffer.commit(committed);

            if committed == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write buffered data",
                ));
            }
        }
    }

    fn inner_mut(&mut self) -> std::io::Result<&mut W> {
        self.writer.as_mut().ok_or_else(|| Error::Released.into())
    }

    fn ensure_open(&self) -> std::io::Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finished => Err(Error::Finished.into()),
            WriterState::Poisoned => Err(Error::Poisoned.into()),
        }
    }

    /// Poison the writer if `result` is an error.
    fn track<T>(&mut self, result: std::io::Result<T>) -> std::io::Result<T> {
        if result.is_err() {
            self.state = WriterState::Poisoned;
        }
        result
    }
}

impl<E, W> std::fmt::Debug for CodecWriter<E, W>
where
    E: Encode,
    W: std::io::Write,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecWriter")
            .field("state", &self.state)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<E, W> std::io::Write for CodecWriter<E, W>
where
    E: Encode,
    W: std::io::Write,
{
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(0);
        }

        let result = self.write_data(data);
        self.track(result)?;

        self.position += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.state {
            WriterState::Open => {}
            WriterState::Finished => return self.inner_mut()?.flush(),
            WriterState::Poisoned => return Err(Error::Poisoned.into()),
        }

        let result = self.flush_stream();
        self.track(result)
    }
}

impl<E, W> Drop for CodecWriter<E, W>
where
    E: Encode,
    W: std::io::Write,
{
    fn drop(&mut self) {
        if self.state != WriterState::Open || self.writer.is_none() {
            return;
        }

        if let Err(err) = self.try_finish() {
            tracing::warn!(
                codec = %self.encoder.codec(),
                %err,
                "failed to finish compressed stream on drop",
            );
        }
    }
}
