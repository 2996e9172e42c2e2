//! Compressed binary frames.
//!
//! After negotiation the relay sends zlib-compressed UTF-8 JSON as binary
//! WebSocket frames. Text frames are never compressed.

use crate::error::{Result, SocketError};
use crate::message::build_req;
use flate2::read::ZlibDecoder;
use serde_json::json;
use std::io::Read;

/// Cache method that switches the session's wire protocol options.
pub const NEGOTIATION_METHOD: &str = "set_primal_protocol";

/// Compression scheme requested during negotiation.
pub const COMPRESSION_ZLIB: &str = "zlib";

/// Inflate a zlib binary frame into frame text.
pub fn inflate(data: &[u8]) -> Result<String> {
    let mut text = String::new();
    ZlibDecoder::new(data)
        .read_to_string(&mut text)
        .map_err(|e| SocketError::Decompression(e.to_string()))?;
    Ok(text)
}

/// REQ frame asking the relay to compress everything it sends afterwards.
pub fn negotiation_frame(subscription_id: &str) -> String {
    let filter = json!({
        "cache": [NEGOTIATION_METHOD, { "compression": COMPRESSION_ZLIB }]
    });
    build_req(subscription_id, &filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(text: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_inflate() {
        let frame = r#"["NOTICE",null,"hello"]"#;
        assert_eq!(inflate(&deflate(frame)).unwrap(), frame);
    }

    #[test]
    fn test_inflate_garbage() {
        let err = inflate(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, SocketError::Decompression(_)));
    }

    #[test]
    fn test_inflate_invalid_utf8() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let data = encoder.finish().unwrap();
        assert!(matches!(inflate(&data), Err(SocketError::Decompression(_))));
    }

    #[test]
    fn test_negotiation_frame() {
        assert_eq!(
            negotiation_frame("linux-1"),
            r#"["REQ","linux-1",{"cache":["set_primal_protocol",{"compression":"zlib"}]}]"#
        );
    }
}
