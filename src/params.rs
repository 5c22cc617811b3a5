//! Range-checked codec parameters.
//!
//! Each parameter is a small `u32` newtype that can only be built from a
//! value the native library accepts, so builders never have to validate
//! their inputs again.

/// Error returned when a parameter value falls outside its supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{parameter} {value} is outside the supported range {min}..={max}")]
pub struct ParameterError {
    pub parameter: &'static str,
    pub value: u32,
    pub min: u32,
    pub max: u32,
}

bounded_parameter! {
    /// DEFLATE compression level, from 0 (store) to 9 (best).
    pub struct GzipLevel in 0..=9, default 6;
}

bounded_parameter! {
    /// bzip2 block size in units of 100 KiB.
    pub struct Bzip2Level in 1..=9, default 9;
}

bounded_parameter! {
    /// How hard bzip2 works on repetitive input before falling back to
    /// its slower sorting algorithm. 0 selects the library default.
    pub struct Bzip2WorkFactor in 0..=250, default 30;
}

bounded_parameter! {
    /// LZ4 compression level. Levels below 3 use the fast compressor,
    /// higher levels the high-compression one.
    pub struct Lz4Level in 0..=12, default 9;
}

bounded_parameter! {
    /// LZMA preset level for raw LZMA and xz streams.
    pub struct LzmaLevel in 0..=9, default 6;
}

bounded_parameter! {
    /// LZMA dictionary size in bytes.
    pub struct LzmaDictionarySize in 4096..=1610612736, default 8388608;
}

bounded_parameter! {
    /// Number of literal context bits. Together with
    /// [`LzmaLiteralPositionBits`] it may not exceed 4.
    pub struct LzmaLiteralContextBits in 0..=4, default 3;
}

bounded_parameter! {
    /// Number of literal position bits.
    pub struct LzmaLiteralPositionBits in 0..=4, default 0;
}

bounded_parameter! {
    /// Number of position bits.
    pub struct LzmaPositionBits in 0..=4, default 2;
}

bounded_parameter! {
    /// Match length the encoder considers good enough to stop searching
    /// (the "fast bytes" setting).
    pub struct LzmaNiceLength in 5..=273, default 64;
}

bounded_parameter! {
    /// Number of worker threads for the multithreaded xz encoder.
    pub struct XzThreads in 1..=256, default 1;
}
