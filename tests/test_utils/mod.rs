#![allow(unused)]

use std::io::{Read, Write};

use proptest::prelude::*;

pub type Data = easy_hex::Hex<Vec<u8>>;

pub const MAX_DATA_LENGTH: usize = 1000;

pub fn arb_data() -> impl Strategy<Value = Data> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=MAX_DATA_LENGTH),
        // Repetitive input, so the codecs actually find matches
        (prop::collection::vec(any::<u8>(), 1..=16), 0..=MAX_DATA_LENGTH / 4).prop_map(
            |(pattern, repeats)| pattern.repeat(repeats)
        ),
    ]
    .prop_map(easy_hex::Hex)
}

pub fn arb_data_with_pos() -> impl Strategy<Value = (Data, usize)> {
    arb_data().prop_flat_map(|data| {
        let len = data.len();
        (Just(data), 0..=len)
    })
}

pub fn arb_chunk_size() -> impl Strategy<Value = usize> {
    1..=64usize
}

/// Wraps a reader and counts calls to `read`, so tests can check when the
/// underlying stream is touched.
pub struct CountingReader<R> {
    pub inner: R,
    pub reads: usize,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, reads: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reads += 1;
        self.inner.read(buf)
    }
}

/// A writer whose contents can be inspected while another writer holds
/// a handle to it.
#[derive(Clone, Default)]
pub struct SharedWriter(pub std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

impl SharedWriter {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Wraps a writer and records each call to `write` and `flush`.
#[derive(Default)]
pub struct RecordingWriter {
    pub data: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
}

impl Write for RecordingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writes += 1;
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Write `data` in chunks of at most `chunk_size` bytes.
pub fn write_in_chunks(writer: &mut impl Write, data: &[u8], chunk_size: usize) {
    for chunk in data.chunks(chunk_size) {
        writer.write_all(chunk).unwrap();
    }
}

/// Read everything from `reader` using a destination of `chunk_size` bytes.
pub fn read_in_chunks(reader: &mut impl Read, chunk_size: usize) -> Vec<u8> {
    let mut decoded = vec![];
    let mut buf = vec![0; chunk_size];

    loop {
        let len = reader.read(&mut buf).unwrap();
        if len == 0 {
            break;
        }
        decoded.extend_from_slice(&buf[..len]);
    }

    decoded
}
