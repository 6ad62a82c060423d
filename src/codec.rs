//! Encoding and decoding of stored article bodies.
//!
//! Bodies have been stored in three shapes over time (see [`StoredBody`]).
//! [`decode`] reads all of them; [`encode`] only ever writes the canonical
//! shape, a raw DEFLATE stream at the best compression level.
//!
//! The canonical bytes are deterministic for a given DEFLATE implementation
//! and level, but they are not guaranteed to be identical across different
//! DEFLATE implementations. Only `decode(encode(b)) == b` is guaranteed.

use std::io::{self, Read, Write};

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::DeflateEncoder;

use crate::error::CodecError;
use crate::models::StoredBody;

/// Historic writers were inconsistent about padding.
const LEGACY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a stored body back into the raw body bytes.
///
/// # Errors
///
/// - [`CodecError::NoBody`] when `stored` is `None` (not downloaded yet)
/// - [`CodecError::CorruptEncoding`] when the base64 or DEFLATE layer is invalid
pub fn decode(stored: Option<&StoredBody>) -> Result<Vec<u8>, CodecError> {
    match stored {
        None => Err(CodecError::NoBody),
        Some(StoredBody::Canonical { data }) => inflate(DeflateDecoder::new(data.as_slice())),
        Some(StoredBody::LegacyA { data, compressed: true }) | Some(StoredBody::LegacyB { data }) => {
            let zlib = decode_legacy_base64(data)?;
            inflate(ZlibDecoder::new(zlib.as_slice()))
        }
        Some(StoredBody::LegacyA { data, compressed: false }) => Ok(data.clone()),
    }
}

/// Encode raw body bytes into the canonical stored shape.
pub fn encode(body: &[u8]) -> Result<StoredBody, CodecError> {
    encode_reader(body)
}

/// Encode everything `reader` yields into the canonical stored shape.
pub fn encode_reader<R: Read>(mut reader: R) -> Result<StoredBody, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    io::copy(&mut reader, &mut encoder).map_err(CodecError::Compress)?;
    encoder.flush().map_err(CodecError::Compress)?;
    let data = encoder.finish().map_err(CodecError::Compress)?;
    Ok(StoredBody::Canonical { data })
}

fn decode_legacy_base64(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LEGACY_BASE64
        .decode(&cleaned)
        .map_err(|e| CodecError::CorruptEncoding(format!("base64: {e}")))
}

fn inflate<R: Read>(mut decoder: R) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::CorruptEncoding(format!("deflate: {e}")))?;
    Ok(out)
}
