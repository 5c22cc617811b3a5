use std::io::{BufReader, Read as _, Write as _};

use assert_matches::assert_matches;
use codec_streams::{
    bzip2::{Bzip2Reader, Bzip2Writer},
    gzip::{GzipReader, GzipWriter},
    lz4::{Lz4Reader, Lz4Writer},
    lz4_legacy::{Lz4LegacyReader, Lz4LegacyWriter},
    lzma::{LzmaReader, LzmaWriter},
    params::LzmaLevel,
    xz::{XzReader, XzWriter},
    Error, ReaderState, WriterState,
};
use easy_hex::Hex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use test_utils::{CountingReader, RecordingWriter, SharedWriter};

mod test_utils;

/// Generates the adapter properties every backend has to satisfy. The
/// `writer` expression builds a writer around the writer bound to `$w`,
/// and `reader` builds a reader around the buffered reader bound to `$r`.
macro_rules! adapter_properties {
    (
        $name:ident,
        cases: $cases:expr,
        writer: |$w:ident| $make_writer:expr,
        reader: |$r:ident| $make_reader:expr $(,)?
    ) => {
        mod $name {
            use super::*;
            use pretty_assertions::assert_eq;

            fn compress(data: &[u8]) -> Vec<u8> {
                let mut encoded = vec![];
                let $w = &mut encoded;
                let mut writer = $make_writer;
                writer.write_all(data).unwrap();
                writer.finish().unwrap();
                encoded
            }

            proptest! {
                #![proptest_config(ProptestConfig::with_cases($cases))]

                #[test]
                fn test_encode_then_decode(data in test_utils::arb_data()) {
                    let encoded = compress(&data);

                    let $r = &encoded[..];
                    let mut reader = $make_reader;
                    let mut decoded = vec![];
                    reader.read_to_end(&mut decoded).unwrap();

                    assert_eq!(Hex(decoded), data);
                    assert_eq!(reader.position(), data.len() as u64);
                    assert_eq!(reader.state(), ReaderState::Finished);
                }

                #[test]
                fn test_small_writes_then_decode(
                    data in test_utils::arb_data(),
                    chunk_size in test_utils::arb_chunk_size(),
                ) {
                    let mut encoded = vec![];
                    {
                        let $w = &mut encoded;
                        let mut writer = $make_writer;
                        test_utils::write_in_chunks(&mut writer, &data, chunk_size);
                        assert_eq!(writer.position(), data.len() as u64);
                        writer.finish().unwrap();
                    }

                    let $r = &encoded[..];
                    let mut reader = $make_reader;
                    let mut decoded = vec![];
                    reader.read_to_end(&mut decoded).unwrap();

                    assert_eq!(Hex(decoded), data);
                }

                #[test]
                fn test_single_byte_writes_match_bulk(data in test_utils::arb_data()) {
                    let bulk = compress(&data);

                    let mut encoded = vec![];
                    {
                        let $w = &mut encoded;
                        let mut writer = $make_writer;
                        test_utils::write_in_chunks(&mut writer, &data, 1);
                        writer.finish().unwrap();
                    }

                    assert_eq!(Hex(encoded), Hex(bulk));
                }

                #[test]
                fn test_small_reads_match_bulk(
                    data in test_utils::arb_data(),
                    chunk_size in test_utils::arb_chunk_size(),
                ) {
                    let encoded = compress(&data);

                    let $r = BufReader::with_capacity(1, &encoded[..]);
                    let mut reader = $make_reader;
                    let decoded = test_utils::read_in_chunks(&mut reader, chunk_size);
                    assert_eq!(Hex(decoded), data);

                    let $r = &encoded[..];
                    let mut reader = $make_reader;
                    let decoded = test_utils::read_in_chunks(&mut reader, 1);
                    assert_eq!(Hex(decoded), data);
                }

                #[test]
                fn test_flush_between_writes_then_decode(
                    (data, pos) in test_utils::arb_data_with_pos(),
                ) {
                    let (first, second) = data.split_at(pos);

                    let mut encoded = vec![];
                    {
                        let $w = &mut encoded;
                        let mut writer = $make_writer;
                        writer.write_all(first).unwrap();
                        writer.flush().unwrap();
                        writer.write_all(second).unwrap();
                        writer.finish().unwrap();
                    }

                    let $r = &encoded[..];
                    let mut reader = $make_reader;
                    let mut decoded = vec![];
                    reader.read_to_end(&mut decoded).unwrap();

                    assert_eq!(Hex(decoded), data);
                }

                #[test]
                fn test_flush_is_idempotent(data in test_utils::arb_data()) {
                    let shared = SharedWriter::default();
                    let $w = shared.clone();
                    let mut writer = $make_writer;

                    writer.write_all(&data).unwrap();
                    writer.flush().unwrap();
                    let flushed_len = shared.len();

                    writer.flush().unwrap();
                    assert_eq!(shared.len(), flushed_len);
                }

                #[test]
                fn test_truncated_stream_fails(data in test_utils::arb_data()) {
                    let encoded = compress(&data);

                    let $r = &encoded[..encoded.len() - 1];
                    let mut reader = $make_reader;
                    let mut decoded = vec![];
                    let err = reader.read_to_end(&mut decoded).unwrap_err();

                    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
                    assert_eq!(reader.state(), ReaderState::Poisoned);
                }
            }

            #[test]
            fn test_zero_length_write_is_noop() {
                let shared = SharedWriter::default();
                let $w = shared.clone();
                let mut writer = $make_writer;
                let header_len = shared.len();

                assert_eq!(writer.write(&[]).unwrap(), 0);
                assert_eq!(writer.position(), 0);
                assert_eq!(shared.len(), header_len);
            }

            #[test]
            fn test_zero_length_read_does_not_touch_stream() {
                let encoded = compress(b"hello");

                let $r = BufReader::new(CountingReader::new(&encoded[..]));
                let mut reader = $make_reader;

                assert_eq!(reader.read(&mut []).unwrap(), 0);
                assert_eq!(reader.get_ref().get_ref().reads, 0);
                assert_eq!(reader.state(), ReaderState::Uninitialized);
            }

            #[test]
            fn test_finished_reader_does_not_touch_stream() {
                let encoded = compress(b"hello hello hello");

                let $r = BufReader::new(CountingReader::new(&encoded[..]));
                let mut reader = $make_reader;
                let mut decoded = vec![];
                reader.read_to_end(&mut decoded).unwrap();
                assert_eq!(decoded, b"hello hello hello");

                let reads = reader.get_ref().get_ref().reads;
                let mut buf = [0; 16];
                assert_eq!(reader.read(&mut buf).unwrap(), 0);
                assert_eq!(reader.read(&mut buf).unwrap(), 0);
                assert_eq!(reader.get_ref().get_ref().reads, reads);
            }

            #[test]
            fn test_write_after_finish_fails() {
                let mut encoded = vec![];
                let $w = &mut encoded;
                let mut writer = $make_writer;

                writer.write_all(b"data").unwrap();
                writer.try_finish().unwrap();
                assert_eq!(writer.state(), WriterState::Finished);
                assert!(!writer.can_write());

                // A second finish is a no-op
                writer.try_finish().unwrap();

                let err = writer.write(b"more").unwrap_err();
                assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
                assert_matches!(
                    err.get_ref().and_then(|inner| inner.downcast_ref::<Error>()),
                    Some(Error::Finished)
                );
            }

            #[test]
            fn test_drop_finishes_stream() {
                let mut encoded = vec![];
                {
                    let $w = &mut encoded;
                    let mut writer = $make_writer;
                    writer.write_all(b"dropped without finish").unwrap();
                }

                let $r = &encoded[..];
                let mut reader = $make_reader;
                let mut decoded = vec![];
                reader.read_to_end(&mut decoded).unwrap();
                assert_eq!(decoded, b"dropped without finish");
            }

            #[test]
            fn test_role_flags() {
                let encoded = compress(b"");

                let $r = &encoded[..];
                let reader = $make_reader;
                assert!(reader.can_read());
                assert!(!reader.can_write());

                let mut sink = vec![];
                let $w = &mut sink;
                let writer = $make_writer;
                assert!(!writer.can_read());
                assert!(writer.can_write());
            }
        }
    };
}

adapter_properties! {
    gzip,
    cases: 256,
    writer: |w| GzipWriter::builder(w).build().unwrap(),
    reader: |r| GzipReader::builder_buffered(r).build().unwrap(),
}

adapter_properties! {
    bzip2,
    cases: 64,
    writer: |w| Bzip2Writer::builder(w).build().unwrap(),
    reader: |r| Bzip2Reader::builder_buffered(r).build().unwrap(),
}

adapter_properties! {
    lz4,
    cases: 128,
    writer: |w| Lz4Writer::builder(w).build().unwrap(),
    reader: |r| Lz4Reader::builder_buffered(r).build().unwrap(),
}

adapter_properties! {
    lz4_legacy,
    cases: 64,
    writer: |w| Lz4LegacyWriter::builder(w).build().unwrap(),
    reader: |r| Lz4LegacyReader::builder_buffered(r).build().unwrap(),
}

adapter_properties! {
    lzma,
    cases: 32,
    writer: |w| LzmaWriter::builder(w)
        .with_level(LzmaLevel::new(1).unwrap())
        .build()
        .unwrap(),
    reader: |r| LzmaReader::builder_buffered(r).build().unwrap(),
}

adapter_properties! {
    xz,
    cases: 32,
    writer: |w| XzWriter::builder(w)
        .with_level(LzmaLevel::new(1).unwrap())
        .build()
        .unwrap(),
    reader: |r| XzReader::builder_buffered(r).build().unwrap(),
}

#[test]
fn test_writer_shared_through_mutex() {
    const CHUNK_LEN: usize = 1000;

    let writer = std::sync::Mutex::new(GzipWriter::builder(vec![]).build().unwrap());
    std::thread::scope(|scope| {
        for byte in 0..4u8 {
            let writer = &writer;
            scope.spawn(move || {
                let chunk = vec![byte; CHUNK_LEN];
                writer.lock().unwrap().write_all(&chunk).unwrap();
            });
        }
    });

    let writer = writer.into_inner().unwrap();
    assert_eq!(writer.position(), 4 * CHUNK_LEN as u64);
    let encoded = writer.finish().unwrap();

    let decoded = codec_streams::gzip::decompress_to_vec(&encoded).unwrap();
    assert_eq!(decoded.len(), 4 * CHUNK_LEN);

    let mut seen = decoded
        .chunks(CHUNK_LEN)
        .map(|chunk| {
            assert!(chunk.iter().all(|&byte| byte == chunk[0]));
            chunk[0]
        })
        .collect::<Vec<_>>();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn test_writer_errors_poison_the_stream() {
    struct FailingWriter;

    impl std::io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    // Compressed output reaches the underlying writer either on the first
    // write or when finishing, depending on how much the codec buffers.
    let mut writer = GzipWriter::builder(FailingWriter).build().unwrap();
    let err = writer
        .write_all(b"data")
        .and_then(|()| writer.try_finish())
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    assert_eq!(writer.state(), WriterState::Poisoned);

    let err = writer.write(b"more").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn test_flush_and_finish_flush_the_underlying_writer() {
    let mut writer = GzipWriter::builder(RecordingWriter::default()).build().unwrap();
    writer.write_all(b"data").unwrap();
    writer.flush().unwrap();
    assert_eq!(writer.position(), 4);

    let inner = writer.finish().unwrap();
    assert_eq!(inner.flushes, 2);
    assert!(inner.writes > 0);
    assert_eq!(codec_streams::gzip::decompress_to_vec(&inner.data).unwrap(), b"data");
}
