use std::io::Read;

use base64::prelude::*;
use flate2::read::GzDecoder;

use crate::types::{HandlerError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode a base64 script, inflating it when the payload is gzip-compressed
///
/// Returns the script text and a diagnostic string of the form
/// `<encoded length>;<script length>;gzip=<0|1>`.
pub fn decode_script(blob: &str) -> Result<(String, String)> {
    let blob = blob.trim();
    let decoded = BASE64_STANDARD
        .decode(blob)
        .map_err(|e| HandlerError::Decode(format!("invalid base64: {e}")))?;

    let gzipped = decoded.starts_with(&GZIP_MAGIC);
    let bytes = if gzipped {
        let mut inflated = Vec::new();
        GzDecoder::new(decoded.as_slice())
            .read_to_end(&mut inflated)
            .map_err(HandlerError::Decompress)?;
        inflated
    } else {
        decoded
    };

    let script = String::from_utf8(bytes)
        .map_err(|e| HandlerError::Decode(format!("script is not valid UTF-8: {e}")))?;
    let info = format!("{};{};gzip={}", blob.len(), script.len(), u8::from(gzipped));

    Ok((script, info))
}
