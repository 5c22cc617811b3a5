use std::io::{Read as _, Write as _};

use assert_matches::assert_matches;
use codec_streams::{
    gzip::{DeflateFormat, GzipReader, GzipWriter},
    params::GzipLevel,
    Codec, Error,
};
use easy_hex::Hex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

mod test_utils;

fn compress(data: &[u8], level: GzipLevel, format: DeflateFormat) -> Vec<u8> {
    let mut writer = GzipWriter::builder(vec![])
        .with_level(level)
        .with_format(format)
        .build()
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

fn decompress(encoded: &[u8], format: DeflateFormat) -> Vec<u8> {
    let mut reader = GzipReader::builder(encoded)
        .with_format(format)
        .build()
        .unwrap();
    let mut decoded = vec![];
    reader.read_to_end(&mut decoded).unwrap();
    decoded
}

fn arb_level() -> impl Strategy<Value = GzipLevel> {
    (GzipLevel::MIN.get()..=GzipLevel::MAX.get()).prop_map(|level| GzipLevel::new(level).unwrap())
}

fn arb_format() -> impl Strategy<Value = DeflateFormat> {
    prop_oneof![
        Just(DeflateFormat::Gzip),
        Just(DeflateFormat::Zlib),
        Just(DeflateFormat::Raw),
    ]
}

proptest! {
    #[test]
    fn test_round_trip_any_level_and_format(
        data in test_utils::arb_data(),
        level in arb_level(),
        format in arb_format(),
    ) {
        let encoded = compress(&data, level, format);
        let decoded = decompress(&encoded, format);

        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_decodes_with_flate2(data in test_utils::arb_data(), level in arb_level()) {
        let encoded = compress(&data, level, DeflateFormat::Gzip);

        let mut decoder = flate2::read::GzDecoder::new(&encoded[..]);
        let mut decoded = vec![];
        decoder.read_to_end(&mut decoded).unwrap();

        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_decodes_zlib_with_flate2(data in test_utils::arb_data()) {
        let encoded = compress(&data, GzipLevel::default(), DeflateFormat::Zlib);

        let mut decoder = flate2::read::ZlibDecoder::new(&encoded[..]);
        let mut decoded = vec![];
        decoder.read_to_end(&mut decoded).unwrap();

        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_reads_flate2_output(data in test_utils::arb_data(), level in 0..=9u32) {
        let mut encoder = flate2::write::GzEncoder::new(vec![], flate2::Compression::new(level));
        encoder.write_all(&data).unwrap();
        let encoded = encoder.finish().unwrap();

        let decoded = decompress(&encoded, DeflateFormat::Gzip);
        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_reads_flate2_raw_output(data in test_utils::arb_data()) {
        let mut encoder = flate2::write::DeflateEncoder::new(vec![], flate2::Compression::fast());
        encoder.write_all(&data).unwrap();
        let encoded = encoder.finish().unwrap();

        let decoded = decompress(&encoded, DeflateFormat::Raw);
        assert_eq!(Hex(decoded), data);
    }

    #[test]
    fn test_flushed_prefix_is_decodable(
        (data, pos) in test_utils::arb_data_with_pos(),
    ) {
        let shared = test_utils::SharedWriter::default();
        let mut writer = GzipWriter::builder(shared.clone()).build().unwrap();
        writer.write_all(&data[..pos]).unwrap();
        writer.flush().unwrap();

        // Everything written before the flush decodes, even though the
        // stream has not ended.
        let flushed = shared.contents();
        let mut decoder = flate2::read::GzDecoder::new(&flushed[..]);
        let mut prefix = vec![0; pos];
        decoder.read_exact(&mut prefix).unwrap();
        assert_eq!(Hex(prefix), Hex(data[..pos].to_vec()));

        writer.write_all(&data[pos..]).unwrap();
        writer.finish().unwrap();
        let decoded = decompress(&shared.contents(), DeflateFormat::Gzip);
        assert_eq!(Hex(decoded), data);
    }
}

#[test]
fn test_byte_at_a_time_matches_bulk() {
    let data = b"the same deflate stream no matter how the input arrives. ".repeat(48);

    for format in [DeflateFormat::Gzip, DeflateFormat::Zlib, DeflateFormat::Raw] {
        let bulk = compress(&data, GzipLevel::default(), format);

        let mut writer = GzipWriter::builder(vec![])
            .with_format(format)
            .build()
            .unwrap();
        test_utils::write_in_chunks(&mut writer, &data, 1);
        let small = writer.finish().unwrap();

        assert_eq!(Hex(small), Hex(bulk), "{format:?}");
    }
}

#[test]
fn test_header_magic() {
    let encoded = compress(b"hello", GzipLevel::default(), DeflateFormat::Gzip);
    assert_eq!(encoded[..2], [0x1f, 0x8b]);
}

#[test]
fn test_corrupt_header_is_invalid_data() {
    let mut encoded = compress(b"hello", GzipLevel::default(), DeflateFormat::Gzip);
    encoded[0] = 0x00;

    let mut reader = GzipReader::builder(&encoded[..]).build().unwrap();
    let mut buf = [0; 16];
    let err = reader.read(&mut buf).unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert_matches!(
        Error::from(err),
        Error::InvalidData {
            codec: Codec::Gzip,
            ..
        }
    );
}

#[test]
fn test_corrupt_trailer_is_invalid_data() {
    let mut encoded = compress(b"hello hello", GzipLevel::default(), DeflateFormat::Gzip);
    let crc_offset = encoded.len() - 8;
    encoded[crc_offset] ^= 0xff;

    let mut reader = GzipReader::builder(&encoded[..]).build().unwrap();
    let mut decoded = vec![];
    let err = reader.read_to_end(&mut decoded).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn test_empty_input_is_truncated() {
    let mut reader = GzipReader::builder(&[][..]).build().unwrap();
    let mut decoded = vec![];
    let err = reader.read_to_end(&mut decoded).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn test_trailing_data_is_left_unread() {
    let mut encoded = compress(b"hello", GzipLevel::default(), DeflateFormat::Gzip);
    encoded.extend_from_slice(b"trailing");

    let mut reader = GzipReader::builder_buffered(&encoded[..]).build().unwrap();
    let mut decoded = vec![];
    reader.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, b"hello");
    assert_eq!(reader.into_inner(), b"trailing");
}

#[test]
fn test_higher_levels_compress_repetitive_data_better() {
    let data = b"the quick brown fox jumps over the lazy dog ".repeat(200);

    let stored = compress(&data, GzipLevel::new(0).unwrap(), DeflateFormat::Gzip);
    let best = compress(&data, GzipLevel::new(9).unwrap(), DeflateFormat::Gzip);

    assert!(stored.len() > data.len());
    assert!(best.len() < data.len() / 10);
}

#[test]
fn test_zero_buffer_size_is_rejected() {
    let result = GzipWriter::builder(vec![]).with_buffer_size(0).build();
    assert_matches!(result, Err(Error::InvalidArgument(_)));
}

#[test]
fn test_tiny_buffer_size_round_trips() {
    let data = b"tiny output buffers still produce a complete stream".repeat(20);

    let mut writer = GzipWriter::builder(vec![])
        .with_buffer_size(1)
        .build()
        .unwrap();
    writer.write_all(&data).unwrap();
    writer.flush().unwrap();
    let encoded = writer.finish().unwrap();

    assert_eq!(decompress(&encoded, DeflateFormat::Gzip), data);
}

#[test]
fn test_one_shot_helpers() {
    let encoded = codec_streams::gzip::compress_to_vec(b"one shot", GzipLevel::default()).unwrap();
    let decoded = codec_streams::gzip::decompress_to_vec(&encoded).unwrap();
    assert_eq!(decoded, b"one shot");
}
