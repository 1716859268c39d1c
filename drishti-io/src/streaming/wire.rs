//! Binary wire codec
//!
//! # TCP Protocol Specification (version 1)
//!
//! Every message, in both directions, starts with a 9-byte header. All
//! multi-byte fields are big-endian (network byte order); floats are IEEE-754
//! binary32.
//!
//! ```text
//! ┌──────────────┬──────────────────────────┬─────────────────────┐
//! │ Tag (1 byte) │ Timestamp (8 bytes)      │ Body (per tag)      │
//! │ u8           │ u64, ns since Unix epoch │                     │
//! └──────────────┴──────────────────────────┴─────────────────────┘
//! ```
//!
//! ## Bodies
//!
//! | Tag | Direction | Body |
//! |-----|-----------|------|
//! | 1, 2 | server → client | height u32, width u32, len u32, `len` payload bytes |
//! | 3 | server → client | x, y, w, h, confidence f32, class_id u32 |
//! | 4–11 | client → server | none |
//! | 12, 13 | client → server | value f32 in [0, 1] |
//! | 14 | client → server | rotation u32, 13 × f32 calibration (56 bytes) |
//! | 15 | client → server | none |
//!
//! Tag 1 is the raw stream, tag 2 the annotated stream. Detection
//! coordinates are the box centre and size as fractions of frame width and
//! height. The frame payload is an encoded image blob the codec never
//! inspects.
//!
//! Calibration field order: old_ppx, old_ppy, old_fy, old_fx, new_ppx,
//! new_ppy, new_fy, new_fx, k1, k2, k3, k4, k5.
//!
//! ## Decoding
//!
//! [`Codec::decode`] is resumable: on a short buffer it returns `Ok(None)` and
//! the caller retries once more bytes arrive. A complete message returns
//! `Ok(Some((message, consumed)))`. Unknown tags, oversized frames and
//! out-of-range values are [`Error::MalformedMessage`].
//! [`Codec::decode_control`] is the server-side entry point; it also rejects
//! tags 1-3 as soon as the tag byte arrives.

use crate::core::types::{LensCalibration, Rotation, TargetClass};
use crate::error::{Error, Result};
use crate::streaming::messages::{
    ControlMessage, DetectionMessage, FrameKind, FrameMessage, Message, tag,
};

/// Wire protocol version described by this module
pub const PROTOCOL_VERSION: u8 = 1;

/// Tag + timestamp
pub const HEADER_LEN: usize = 9;

/// Height, width, payload length
pub const FRAME_FIELDS_LEN: usize = 12;

pub const DETECTION_BODY_LEN: usize = 24;

pub const CALIBRATION_BODY_LEN: usize = 4 + 4 * LensCalibration::FIELD_COUNT;

/// Default upper bound on a frame payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

#[inline]
fn be_u32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn be_f32(b: &[u8], at: usize) -> f32 {
    f32::from_bits(be_u32(b, at))
}

#[inline]
fn be_u64(b: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&b[at..at + 8]);
    u64::from_be_bytes(bytes)
}

fn unit_interval(name: &str, v: f32) -> Result<f32> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(Error::MalformedMessage(format!(
            "{} {} outside [0, 1]",
            name, v
        )))
    }
}

/// Stateless encoder/decoder with a payload size limit
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    max_payload_bytes: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl Codec {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Encoded size of a message
    pub fn encoded_len(msg: &Message) -> usize {
        HEADER_LEN
            + match msg {
                Message::Frame(f) => FRAME_FIELDS_LEN + f.payload.len(),
                Message::Detection(_) => DETECTION_BODY_LEN,
                Message::Control { message, .. } => match message {
                    ControlMessage::SetConfidence(_) | ControlMessage::SetIou(_) => 4,
                    ControlMessage::SetCalibration { .. } => CALIBRATION_BODY_LEN,
                    _ => 0,
                },
            }
    }

    /// Append the encoding of `msg` to `buf`
    pub fn encode(msg: &Message, buf: &mut Vec<u8>) {
        buf.reserve(Self::encoded_len(msg));
        buf.push(msg.tag());
        buf.extend_from_slice(&msg.timestamp_ns().to_be_bytes());

        match msg {
            Message::Frame(f) => {
                buf.extend_from_slice(&f.height.to_be_bytes());
                buf.extend_from_slice(&f.width.to_be_bytes());
                buf.extend_from_slice(&(f.payload.len() as u32).to_be_bytes());
                buf.extend_from_slice(&f.payload);
            }
            Message::Detection(d) => {
                for v in [d.x, d.y, d.w, d.h, d.confidence] {
                    buf.extend_from_slice(&v.to_be_bytes());
                }
                buf.extend_from_slice(&d.class_id.to_be_bytes());
            }
            Message::Control { message, .. } => match message {
                ControlMessage::SetConfidence(v) | ControlMessage::SetIou(v) => {
                    buf.extend_from_slice(&v.to_be_bytes());
                }
                ControlMessage::SetCalibration {
                    rotation,
                    calibration,
                } => {
                    buf.extend_from_slice(&rotation.degrees().to_be_bytes());
                    for v in calibration.to_array() {
                        buf.extend_from_slice(&v.to_be_bytes());
                    }
                }
                _ => {}
            },
        }
    }

    /// Encode into a fresh buffer
    pub fn encode_to_vec(msg: &Message) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_len(msg));
        Self::encode(msg, &mut buf);
        buf
    }

    /// Body length for a tag, or `None` if it depends on frame fields not
    /// yet received
    fn body_len(&self, buf: &[u8]) -> Result<Option<usize>> {
        let t = buf[0];
        let len = match t {
            tag::RAW_FRAME | tag::ANNOTATED_FRAME => {
                if buf.len() < HEADER_LEN + FRAME_FIELDS_LEN {
                    return Ok(None);
                }
                let payload = be_u32(buf, HEADER_LEN + 8) as usize;
                if payload > self.max_payload_bytes {
                    return Err(Error::MalformedMessage(format!(
                        "frame payload {} exceeds limit {}",
                        payload, self.max_payload_bytes
                    )));
                }
                FRAME_FIELDS_LEN + payload
            }
            tag::DETECTION => DETECTION_BODY_LEN,
            tag::STREAM_ON..=tag::DETECT_OFF | tag::CAPTURE_SNAPSHOT => 0,
            tag::SET_CONFIDENCE | tag::SET_IOU => 4,
            tag::SET_CALIBRATION => CALIBRATION_BODY_LEN,
            other => {
                return Err(Error::MalformedMessage(format!(
                    "unknown tag {:#04x}",
                    other
                )));
            }
        };
        Ok(Some(len))
    }

    /// Decode one message from the front of `buf`
    ///
    /// Returns `Ok(None)` until the whole message is present.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Message, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }
        // Reject unknown tags on the first byte
        let Some(body) = self.body_len(buf)? else {
            return Ok(None);
        };
        let total = HEADER_LEN + body;
        if buf.len() < total {
            return Ok(None);
        }

        let t = buf[0];
        let timestamp_ns = be_u64(buf, 1);
        let b = &buf[HEADER_LEN..total];

        let control = |message| Message::Control {
            timestamp_ns,
            message,
        };

        let msg = match t {
            tag::RAW_FRAME | tag::ANNOTATED_FRAME => Message::Frame(FrameMessage {
                kind: if t == tag::RAW_FRAME {
                    FrameKind::Raw
                } else {
                    FrameKind::Annotated
                },
                timestamp_ns,
                height: be_u32(b, 0),
                width: be_u32(b, 4),
                payload: b[FRAME_FIELDS_LEN..].to_vec(),
            }),
            tag::DETECTION => Message::Detection(DetectionMessage {
                timestamp_ns,
                x: be_f32(b, 0),
                y: be_f32(b, 4),
                w: be_f32(b, 8),
                h: be_f32(b, 12),
                confidence: be_f32(b, 16),
                class_id: be_u32(b, 20),
            }),
            tag::STREAM_ON => control(ControlMessage::StreamOn),
            tag::DETECT_STREAM_ON => control(ControlMessage::DetectStreamOn),
            tag::STREAM_OFF => control(ControlMessage::StreamOff),
            tag::DETECT_STREAM_OFF => control(ControlMessage::DetectStreamOff),
            tag::SELECT_WORKPIECE => control(ControlMessage::SelectClass(TargetClass::Workpiece)),
            tag::SELECT_CONVEYOR => control(ControlMessage::SelectClass(TargetClass::Conveyor)),
            tag::SELECT_SLIDE => control(ControlMessage::SelectClass(TargetClass::Slide)),
            tag::DETECT_OFF => control(ControlMessage::DetectOff),
            tag::SET_CONFIDENCE => control(ControlMessage::SetConfidence(unit_interval(
                "confidence",
                be_f32(b, 0),
            )?)),
            tag::SET_IOU => control(ControlMessage::SetIou(unit_interval("iou", be_f32(b, 0))?)),
            tag::SET_CALIBRATION => {
                let rotation = Rotation::try_from(be_u32(b, 0))?;
                let mut values = [0f32; LensCalibration::FIELD_COUNT];
                for (i, v) in values.iter_mut().enumerate() {
                    *v = be_f32(b, 4 + 4 * i);
                }
                let calibration = LensCalibration::from_array(values);
                if !calibration.is_finite() {
                    return Err(Error::MalformedMessage(
                        "calibration contains non-finite values".to_string(),
                    ));
                }
                control(ControlMessage::SetCalibration {
                    rotation,
                    calibration,
                })
            }
            tag::CAPTURE_SNAPSHOT => control(ControlMessage::CaptureSnapshot),
            other => {
                return Err(Error::MalformedMessage(format!(
                    "unknown tag {:#04x}",
                    other
                )));
            }
        };

        Ok(Some((msg, total)))
    }

    /// Decode one client-to-server message from the front of `buf`
    ///
    /// Outbound-only tags (1-3) are rejected on the first byte, before any
    /// declared body is waited for.
    pub fn decode_control(&self, buf: &[u8]) -> Result<Option<(ControlMessage, usize)>> {
        match buf.first() {
            None => return Ok(None),
            Some(&t @ tag::RAW_FRAME..=tag::DETECTION) => {
                return Err(Error::MalformedMessage(format!(
                    "outbound-only tag {} from client",
                    t
                )));
            }
            Some(_) => {}
        }
        match self.decode(buf)? {
            Some((Message::Control { message, .. }, used)) => Ok(Some((message, used))),
            Some((other, _)) => Err(Error::MalformedMessage(format!(
                "outbound-only tag {} from client",
                other.tag()
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn control(message: ControlMessage) -> Message {
        Message::Control {
            timestamp_ns: 0x0102_0304_0506_0708,
            message,
        }
    }

    fn all_controls() -> Vec<ControlMessage> {
        vec![
            ControlMessage::StreamOn,
            ControlMessage::DetectStreamOn,
            ControlMessage::StreamOff,
            ControlMessage::DetectStreamOff,
            ControlMessage::SelectClass(TargetClass::Workpiece),
            ControlMessage::SelectClass(TargetClass::Conveyor),
            ControlMessage::SelectClass(TargetClass::Slide),
            ControlMessage::DetectOff,
            ControlMessage::SetConfidence(0.55),
            ControlMessage::SetIou(1.0),
            ControlMessage::SetCalibration {
                rotation: Rotation::Deg270,
                calibration: LensCalibration::robotino(),
            },
            ControlMessage::CaptureSnapshot,
        ]
    }

    #[test]
    fn test_header_is_big_endian() {
        let bytes = Codec::encode_to_vec(&control(ControlMessage::StreamOff));
        assert_eq!(bytes, vec![6, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_control_tags() {
        let tags: Vec<u8> = all_controls().iter().map(|c| c.tag()).collect();
        assert_eq!(tags, (4..=15).collect::<Vec<u8>>());
    }

    #[test]
    fn test_frame_layout() {
        let msg = Message::Frame(FrameMessage {
            kind: FrameKind::Annotated,
            timestamp_ns: 1,
            height: 480,
            width: 640,
            payload: vec![0xAA, 0xBB, 0xCC],
        });
        let bytes = Codec::encode_to_vec(&msg);
        assert_eq!(bytes.len(), HEADER_LEN + FRAME_FIELDS_LEN + 3);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[9..13], &480u32.to_be_bytes());
        assert_eq!(&bytes[13..17], &640u32.to_be_bytes());
        assert_eq!(&bytes[17..21], &3u32.to_be_bytes());
        assert_eq!(&bytes[21..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_detection_layout() {
        let msg = Message::Detection(DetectionMessage {
            timestamp_ns: 9,
            x: 0.5,
            y: 0.25,
            w: 0.125,
            h: 1.0,
            confidence: 0.75,
            class_id: 2,
        });
        let bytes = Codec::encode_to_vec(&msg);
        assert_eq!(bytes.len(), HEADER_LEN + DETECTION_BODY_LEN);
        assert_eq!(&bytes[9..13], &0.5f32.to_be_bytes());
        assert_eq!(&bytes[17..21], &0.125f32.to_be_bytes());
        assert_eq!(&bytes[21..25], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[29..33], &2u32.to_be_bytes());
    }

    #[test]
    fn test_calibration_payload_is_56_bytes() {
        let msg = control(ControlMessage::SetCalibration {
            rotation: Rotation::Deg90,
            calibration: LensCalibration::identity(),
        });
        let bytes = Codec::encode_to_vec(&msg);
        assert_eq!(bytes.len(), HEADER_LEN + 56);
        assert_eq!(&bytes[9..13], &90u32.to_be_bytes());
    }

    #[test]
    fn test_control_round_trip() {
        let codec = Codec::default();
        for c in all_controls() {
            let msg = control(c);
            let bytes = Codec::encode_to_vec(&msg);
            let (decoded, used) = codec.decode(&bytes).unwrap().unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(used, bytes.len());
        }
    }

    #[test]
    fn test_random_detection_and_frame_round_trip() {
        let codec = Codec::default();
        let mut rng = rand::rng();
        for _ in 0..500 {
            let det = Message::Detection(DetectionMessage {
                timestamp_ns: rng.random(),
                x: rng.random_range(0.0..=1.0),
                y: rng.random_range(0.0..=1.0),
                w: rng.random_range(0.0..=1.0),
                h: rng.random_range(0.0..=1.0),
                confidence: rng.random_range(0.0..=1.0),
                class_id: rng.random(),
            });
            let bytes = Codec::encode_to_vec(&det);
            assert_eq!(codec.decode(&bytes).unwrap().unwrap().0, det);

            let len = rng.random_range(0..2048);
            let frame = Message::Frame(FrameMessage {
                kind: if rng.random() {
                    FrameKind::Raw
                } else {
                    FrameKind::Annotated
                },
                timestamp_ns: rng.random(),
                height: rng.random(),
                width: rng.random(),
                payload: (0..len).map(|_| rng.random()).collect(),
            });
            let bytes = Codec::encode_to_vec(&frame);
            let (decoded, used) = codec.decode(&bytes).unwrap().unwrap();
            assert_eq!(decoded, frame);
            assert_eq!(used, HEADER_LEN + FRAME_FIELDS_LEN + len);
        }
    }

    #[test]
    fn test_random_control_round_trip() {
        let codec = Codec::default();
        let mut rng = rand::rng();
        let rotations = [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ];
        for i in 0..500 {
            let mut values = [0f32; LensCalibration::FIELD_COUNT];
            for v in values.iter_mut() {
                *v = rng.random_range(-1.0e4..=1.0e4);
            }
            let controls = [
                ControlMessage::SetConfidence(rng.random_range(0.0..=1.0)),
                ControlMessage::SetIou(rng.random_range(0.0..=1.0)),
                ControlMessage::SetCalibration {
                    rotation: rotations[i % rotations.len()],
                    calibration: LensCalibration::from_array(values),
                },
            ];
            for message in controls {
                let msg = Message::Control {
                    timestamp_ns: rng.random(),
                    message,
                };
                let bytes = Codec::encode_to_vec(&msg);
                let (decoded, used) = codec.decode(&bytes).unwrap().unwrap();
                assert_eq!(decoded, msg);
                assert_eq!(used, bytes.len());
                assert_eq!(
                    codec.decode_control(&bytes).unwrap().unwrap(),
                    (message, bytes.len())
                );
            }
        }
    }

    #[test]
    fn test_decode_control_rejects_outbound_tags_early() {
        let codec = Codec::default();
        // Frame header announcing a 15 MiB payload, body not yet sent
        let mut bytes = vec![tag::RAW_FRAME];
        bytes.extend_from_slice(&7u64.to_be_bytes());
        assert!(matches!(
            codec.decode_control(&bytes),
            Err(Error::MalformedMessage(_))
        ));
        for t in [tag::ANNOTATED_FRAME, tag::DETECTION] {
            assert!(matches!(
                codec.decode_control(&[t]),
                Err(Error::MalformedMessage(_))
            ));
        }
        // The general decoder still waits for outbound bodies
        assert!(codec.decode(&bytes).unwrap().is_none());
        assert!(codec.decode_control(&[]).unwrap().is_none());
        assert!(codec.decode_control(&[tag::SET_IOU, 0, 0]).unwrap().is_none());
    }

    #[test]
    fn test_byte_by_byte_matches_whole_buffer() {
        let codec = Codec::default();
        let mut stream = Vec::new();
        for c in all_controls() {
            Codec::encode(&control(c), &mut stream);
        }
        Codec::encode(
            &Message::Frame(FrameMessage {
                kind: FrameKind::Raw,
                timestamp_ns: 3,
                height: 2,
                width: 2,
                payload: vec![7; 100],
            }),
            &mut stream,
        );

        // Whole buffer
        let mut whole = Vec::new();
        let mut offset = 0;
        while let Some((msg, used)) = codec.decode(&stream[offset..]).unwrap() {
            whole.push(msg);
            offset += used;
        }
        assert_eq!(offset, stream.len());

        // One byte at a time
        let mut chunked = Vec::new();
        let mut pending = Vec::new();
        for byte in &stream {
            pending.push(*byte);
            while let Some((msg, used)) = codec.decode(&pending).unwrap() {
                chunked.push(msg);
                pending.drain(..used);
            }
        }
        assert!(pending.is_empty());
        assert_eq!(chunked, whole);
        assert_eq!(whole.len(), 13);
    }

    #[test]
    fn test_short_input_needs_more() {
        let codec = Codec::default();
        assert!(codec.decode(&[]).unwrap().is_none());
        assert!(codec.decode(&[12, 0, 0]).unwrap().is_none());
        assert!(codec.decode(&[1; 15]).unwrap().is_none());
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let codec = Codec::default();
        for bad in [0u8, 16, 0xFF] {
            let err = codec.decode(&[bad]).unwrap_err();
            assert!(matches!(err, Error::MalformedMessage(_)));
        }
    }

    #[test]
    fn test_out_of_range_values_are_malformed() {
        let codec = Codec::default();
        for v in [1.5f32, -0.1, f32::NAN, f32::INFINITY] {
            let mut bytes = vec![tag::SET_IOU];
            bytes.extend_from_slice(&0u64.to_be_bytes());
            bytes.extend_from_slice(&v.to_be_bytes());
            assert!(matches!(
                codec.decode(&bytes),
                Err(Error::MalformedMessage(_))
            ));
        }

        let mut bytes = Codec::encode_to_vec(&control(ControlMessage::SetCalibration {
            rotation: Rotation::Deg0,
            calibration: LensCalibration::identity(),
        }));
        bytes[9..13].copy_from_slice(&45u32.to_be_bytes());
        assert!(matches!(
            codec.decode(&bytes),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_from_header() {
        let codec = Codec::new(1024);
        let mut bytes = vec![tag::RAW_FRAME];
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&4096u32.to_be_bytes());
        assert!(matches!(
            codec.decode(&bytes),
            Err(Error::MalformedMessage(_))
        ));
    }
}
