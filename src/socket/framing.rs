//! Wire framing for the host socket.
//!
//! Length-prefixed frames, one MessagePack value per frame:
//!
//! ```text
//! [u32 LE length] [payload: length bytes]
//! ```
//!
//! Framing and content decoding are separate steps. [`FrameDecoder`] only
//! reassembles payloads across arbitrary read boundaries; turning a payload
//! into a [`HostMessage`] happens afterwards, so a malformed payload costs
//! one message, not the connection.

use anyhow::{bail, Result};
use bytes::{Buf, BytesMut};
use serde::Serialize;

use crate::constants::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
use crate::error::Error;
use crate::protocol::{self, HostMessage};

/// Prefix `payload` with its little-endian length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u32;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Serialize `value` and frame it.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let payload = protocol::to_payload(value)?;
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(Error::Encode(format!(
            "payload of {} bytes exceeds the {MAX_FRAME_SIZE} byte frame limit",
            payload.len()
        )));
    }
    Ok(encode_frame(&payload))
}

/// Decode one reassembled payload into a host message.
pub fn decode_message(payload: &[u8]) -> Result<HostMessage, Error> {
    protocol::from_payload(payload)
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete payloads.
/// Handles stream reassembly: a frame may arrive split anywhere, including
/// inside the length prefix.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all complete payloads.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a declared length exceeds [`MAX_FRAME_SIZE`]; the
    /// stream can no longer be trusted after that.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        loop {
            // Need the full length header
            if self.buf.len() < LENGTH_PREFIX_SIZE {
                break;
            }

            let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            if length > MAX_FRAME_SIZE {
                bail!("Frame too large: {length} bytes (max {MAX_FRAME_SIZE})");
            }

            let total = LENGTH_PREFIX_SIZE + length as usize;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            self.buf.advance(LENGTH_PREFIX_SIZE);
            let payload = self.buf.split_to(length as usize);
            payloads.push(payload.to_vec());
        }

        Ok(payloads)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, UiEvent, WidgetKind, WidgetStyle};

    fn sample_command() -> Command {
        let mut style = WidgetStyle::new();
        style.insert("gap", 8.0);
        style.insert("direction", "column");
        Command::CreateWidget {
            id: "el_12".to_string(),
            kind: WidgetKind::Flex,
            parent_id: Some("el_3".to_string()),
            text: None,
            style: Some(style),
            params: None,
            data: None,
        }
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        let frame = encode_frame(&[1, 2, 3]);
        assert_eq!(frame, vec![3, 0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_every_chunk_size_reassembles_command() {
        let cmd = sample_command();
        let encoded = encode_value(&cmd).unwrap();

        for chunk_size in 1..=encoded.len() {
            let mut decoder = FrameDecoder::new();
            let mut payloads = Vec::new();
            for chunk in encoded.chunks(chunk_size) {
                payloads.extend(decoder.feed(chunk).unwrap());
            }
            assert_eq!(payloads.len(), 1, "chunk size {chunk_size}");
            let decoded: Command = protocol::from_payload(&payloads[0]).unwrap();
            assert_eq!(decoded, cmd, "chunk size {chunk_size}");
            assert!(!decoder.has_partial());
        }
    }

    #[test]
    fn test_split_inside_length_prefix() {
        let msg = HostMessage::UiEvent {
            event: UiEvent::widget_action("el_1", "click"),
        };
        let encoded = encode_value(&msg).unwrap();

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&encoded[..2]).unwrap().is_empty());
        assert!(decoder.has_partial());
        let payloads = decoder.feed(&encoded[2..]).unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(decode_message(&payloads[0]).unwrap(), msg);
    }

    #[test]
    fn test_multiple_frames_in_single_feed() {
        let f1 = encode_value(&HostMessage::UiEvent {
            event: UiEvent::widget_action("el_1", "click"),
        })
        .unwrap();
        let f2 = encode_value(&HostMessage::Shutdown).unwrap();

        let mut buf = f1.clone();
        buf.extend_from_slice(&f2);
        // Trailing half of a third frame stays buffered
        buf.extend_from_slice(&f1[..3]);

        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(&buf).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(decode_message(&payloads[1]).unwrap(), HostMessage::Shutdown);
        assert!(decoder.has_partial());
    }

    #[test]
    fn test_zero_length_frame_yields_empty_payload() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(&[0, 0, 0, 0]).unwrap();
        assert_eq!(payloads, vec![Vec::<u8>::new()]);
        // Framing is fine, content is not
        assert!(decode_message(&payloads[0]).is_err());
    }

    #[test]
    fn test_large_image_fits_in_one_frame() {
        // Close to half the frame limit; as an integer array this would overflow it
        let raw = vec![0xAB; (MAX_FRAME_SIZE / 2) as usize];
        let frame = encode_value(&Command::SetImageData {
            id: "el_9".to_string(),
            data: raw.clone(),
        })
        .unwrap();

        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(&frame).unwrap();
        assert_eq!(payloads.len(), 1);
        let value = rmpv::decode::read_value(&mut payloads[0].as_slice()).unwrap();
        let data = value
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_str() == Some("data"))
            .map(|(_, v)| v)
            .unwrap();
        assert!(data.is_bin());
        assert_eq!(data.as_slice().map(<[u8]>::len), Some(raw.len()));

        let decoded: Command = protocol::from_payload(&payloads[0]).unwrap();
        assert!(matches!(decoded, Command::SetImageData { data, .. } if data == raw));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let length = MAX_FRAME_SIZE + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&length.to_le_bytes()).is_err());
    }

    #[test]
    fn test_malformed_payload_does_not_poison_decoder() {
        let mut buf = encode_frame(&[0xff, 0xfe]);
        buf.extend_from_slice(&encode_value(&HostMessage::Shutdown).unwrap());

        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(&buf).unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(decode_message(&payloads[0]).is_err());
        assert_eq!(decode_message(&payloads[1]).unwrap(), HostMessage::Shutdown);
    }
}
