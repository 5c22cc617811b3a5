use std::io::{Read as _, Write as _};

use assert_matches::assert_matches;
use codec_streams::{
    bzip2::{Bzip2Reader, Bzip2Writer},
    params::{Bzip2Level, Bzip2WorkFactor},
    Codec, Error,
};
use easy_hex::Hex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

mod test_utils;

fn compress(data: &[u8], level: Bzip2Level) -> Vec<u8> {
    let mut writer = Bzip2Writer::builder(vec![])
        .with_level(level)
        .build()
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

fn arb_level() -> impl Strategy<Value = Bzip2Level> {
    (Bzip2Level::MIN.get()..=Bzip2Level::MAX.get())
        .prop_map(|level| Bzip2Level::new(level).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_decodes_with_bzip2_crate(data in test_utils::arb_data(), level in arb_level()) {
        let encoded = compress(&data, level);

        let mut decoder = bzip2::read::BzDecoder::new(&encoded[..]);
        let mut decoded = vec![];
        decoder.read_to_end(&mut decoded).unwrap();

        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_reads_bzip2_crate_output(data in test_utils::arb_data(), level in 1..=9u32) {
        let mut encoder = bzip2::write::BzEncoder::new(vec![], bzip2::Compression::new(level));
        encoder.write_all(&data).unwrap();
        let encoded = encoder.finish().unwrap();

        let mut reader = Bzip2Reader::builder(&encoded[..]).build().unwrap();
        let mut decoded = vec![];
        reader.read_to_end(&mut decoded).unwrap();

        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_chunked_writes_produce_identical_output(
        data in test_utils::arb_data(),
        chunk_size in test_utils::arb_chunk_size(),
    ) {
        let bulk = compress(&data, Bzip2Level::default());

        let mut writer = Bzip2Writer::builder(vec![]).build().unwrap();
        test_utils::write_in_chunks(&mut writer, &data, chunk_size);
        let chunked = writer.finish().unwrap();

        assert_eq!(Hex(chunked), Hex(bulk));
    }

    #[test]
    fn test_small_memory_decoder(data in test_utils::arb_data()) {
        let encoded = compress(&data, Bzip2Level::default());

        let mut reader = Bzip2Reader::builder(&encoded[..])
            .with_small_memory(true)
            .build()
            .unwrap();
        let mut decoded = vec![];
        reader.read_to_end(&mut decoded).unwrap();

        assert_eq!(Hex(decoded), data);
    }
}

#[test]
fn test_header_magic() {
    let encoded = compress(b"hello", Bzip2Level::new(9).unwrap());
    assert_eq!(&encoded[..4], b"BZh9");

    let encoded = compress(b"hello", Bzip2Level::new(1).unwrap());
    assert_eq!(&encoded[..4], b"BZh1");
}

#[test]
fn test_work_factor_does_not_change_output_format() {
    let data = b"abababababababababab".repeat(100);

    let mut writer = Bzip2Writer::builder(vec![])
        .with_work_factor(Bzip2WorkFactor::new(250).unwrap())
        .build()
        .unwrap();
    writer.write_all(&data).unwrap();
    let encoded = writer.finish().unwrap();

    assert_eq!(codec_streams::bzip2::decompress_to_vec(&encoded).unwrap(), data);
}

#[test]
fn test_corrupt_magic_is_invalid_data() {
    let mut encoded = compress(b"hello", Bzip2Level::default());
    encoded[0] = b'X';

    let mut reader = Bzip2Reader::builder(&encoded[..]).build().unwrap();
    let mut buf = [0; 16];
    let err = reader.read(&mut buf).unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert_matches!(
        Error::from(err),
        Error::InvalidData {
            codec: Codec::Bzip2,
            ..
        }
    );
}

#[test]
fn test_corrupt_block_is_invalid_data() {
    let data = b"some data that fills a block ".repeat(50);
    let mut encoded = compress(&data, Bzip2Level::default());
    let middle = encoded.len() / 2;
    encoded[middle] ^= 0xff;

    let mut reader = Bzip2Reader::builder(&encoded[..]).build().unwrap();
    let mut decoded = vec![];
    let err = reader.read_to_end(&mut decoded).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn test_one_shot_helpers() {
    let encoded =
        codec_streams::bzip2::compress_to_vec(b"one shot", Bzip2Level::default()).unwrap();
    let decoded = codec_streams::bzip2::decompress_to_vec(&encoded).unwrap();
    assert_eq!(decoded, b"one shot");
}
