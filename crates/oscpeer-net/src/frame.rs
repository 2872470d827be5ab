//! OSC stream framing for TCP
//!
//! A byte stream needs a rule that delimits OSC packets; the rule depends
//! on the OSC version:
//!
//! - OSC 1.1: each packet is preceded by a 4-byte big-endian length prefix.
//! - OSC 1.0: SLIP (RFC 1055). Frames are `END` (0xC0) delimited, with the
//!   double-END convention on send; `END`/`ESC` bytes inside the payload
//!   are escaped as `ESC ESC_END` / `ESC ESC_ESC`.
//!
//! UDP needs neither: the datagram boundary is the frame boundary.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::{PeerError, Result};

/// Maximum accepted frame payload (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

const SLIP_END: u8 = 0xC0;
const SLIP_ESC: u8 = 0xDB;
const SLIP_ESC_END: u8 = 0xDC;
const SLIP_ESC_ESC: u8 = 0xDD;

/// Stream framing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// 4-byte big-endian length prefix (OSC 1.1)
    LengthPrefix,
    /// SLIP, RFC 1055 (OSC 1.0)
    Slip,
}

/// Frame a packet payload for the wire.
pub fn encode_frame(framing: Framing, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(PeerError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    match framing {
        Framing::LengthPrefix => {
            let mut frame = BytesMut::with_capacity(4 + payload.len());
            frame.put_u32(payload.len() as u32);
            frame.extend_from_slice(payload);
            Ok(frame.freeze())
        }
        Framing::Slip => {
            let mut frame = BytesMut::with_capacity(payload.len() + 2);
            frame.put_u8(SLIP_END);
            for &byte in payload {
                match byte {
                    SLIP_END => {
                        frame.put_u8(SLIP_ESC);
                        frame.put_u8(SLIP_ESC_END);
                    }
                    SLIP_ESC => {
                        frame.put_u8(SLIP_ESC);
                        frame.put_u8(SLIP_ESC_ESC);
                    }
                    _ => frame.put_u8(byte),
                }
            }
            frame.put_u8(SLIP_END);
            Ok(frame.freeze())
        }
    }
}

/// Incremental frame extractor for one stream direction.
///
/// Feed raw reads with [`extend`](Self::extend), then pull complete frames
/// with [`next_frame`](Self::next_frame) until it returns `Ok(None)`;
/// partial frames stay buffered across reads.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buf: BytesMut,
    max_frame: usize,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self::with_max_frame(framing, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame(framing: Framing, max_frame: usize) -> Self {
        Self {
            framing,
            buf: BytesMut::with_capacity(8192),
            max_frame,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete frame, or `Ok(None)` when more bytes are needed.
    ///
    /// On an oversize frame the buffered bytes are discarded and an error
    /// is returned; for SLIP the next `END` resynchronizes, for the length
    /// prefix the stream is unrecoverable and should be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match self.framing {
            Framing::LengthPrefix => {
                if self.buf.len() < 4 {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                    as usize;
                if len > self.max_frame {
                    self.buf.clear();
                    return Err(PeerError::FrameTooLarge {
                        size: len,
                        max: self.max_frame,
                    });
                }
                if self.buf.len() < 4 + len {
                    return Ok(None);
                }
                self.buf.advance(4);
                Ok(Some(self.buf.split_to(len).freeze()))
            }
            Framing::Slip => loop {
                match self.buf.iter().position(|&b| b == SLIP_END) {
                    None => {
                        // an escaped payload is at most twice its size
                        if self.buf.len() > 2 * self.max_frame + 2 {
                            let size = self.buf.len();
                            self.buf.clear();
                            return Err(PeerError::FrameTooLarge {
                                size,
                                max: self.max_frame,
                            });
                        }
                        return Ok(None);
                    }
                    Some(end) => {
                        let raw = self.buf.split_to(end);
                        self.buf.advance(1);
                        if raw.is_empty() {
                            // back-to-back END delimiters carry no frame
                            continue;
                        }
                        let payload = slip_unescape(&raw);
                        if payload.len() > self.max_frame {
                            return Err(PeerError::FrameTooLarge {
                                size: payload.len(),
                                max: self.max_frame,
                            });
                        }
                        return Ok(Some(payload));
                    }
                }
            },
        }
    }
}

fn slip_unescape(raw: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&byte) = bytes.next() {
        if byte != SLIP_ESC {
            out.put_u8(byte);
            continue;
        }
        match bytes.next() {
            Some(&SLIP_ESC_END) => out.put_u8(SLIP_END),
            Some(&SLIP_ESC_ESC) => out.put_u8(SLIP_ESC),
            Some(&other) => {
                // RFC 1055: leave a bogus escape in place rather than drop data
                debug!(byte = other, "invalid SLIP escape");
                out.put_u8(other);
            }
            None => debug!("dangling SLIP escape at end of frame"),
        }
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_round_trip() {
        let frame = encode_frame(Framing::LengthPrefix, b"osc-payload").unwrap();
        assert_eq!(&frame[..4], &11u32.to_be_bytes());

        let mut decoder = FrameDecoder::new(Framing::LengthPrefix);
        decoder.extend(&frame);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"osc-payload");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn length_prefix_partial_arrivals() {
        let frame = encode_frame(Framing::LengthPrefix, b"split").unwrap();
        let mut decoder = FrameDecoder::new(Framing::LengthPrefix);

        decoder.extend(&frame[..2]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&frame[2..6]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&frame[6..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"split");
    }

    #[test]
    fn length_prefix_multiple_frames_per_read() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(Framing::LengthPrefix, b"one").unwrap());
        stream.extend_from_slice(&encode_frame(Framing::LengthPrefix, b"two").unwrap());

        let mut decoder = FrameDecoder::new(Framing::LengthPrefix);
        decoder.extend(&stream);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"two");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn length_prefix_rejects_oversize() {
        let mut decoder = FrameDecoder::with_max_frame(Framing::LengthPrefix, 16);
        decoder.extend(&1024u32.to_be_bytes());
        assert!(matches!(
            decoder.next_frame(),
            Err(PeerError::FrameTooLarge { size: 1024, .. })
        ));
    }

    #[test]
    fn slip_round_trip_with_escapes() {
        let payload = [0x01, SLIP_END, 0x02, SLIP_ESC, 0x03];
        let frame = encode_frame(Framing::Slip, &payload).unwrap();
        // both delimiters present, payload bytes escaped
        assert_eq!(frame[0], SLIP_END);
        assert_eq!(frame[frame.len() - 1], SLIP_END);
        assert_eq!(frame.len(), payload.len() + 2 + 2);

        let mut decoder = FrameDecoder::new(Framing::Slip);
        decoder.extend(&frame);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), &payload);
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn slip_skips_empty_frames() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(Framing::Slip, b"a").unwrap());
        stream.extend_from_slice(&encode_frame(Framing::Slip, b"b").unwrap());

        let mut decoder = FrameDecoder::new(Framing::Slip);
        decoder.extend(&stream);
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"a");
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"b");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn slip_partial_arrivals() {
        let frame = encode_frame(Framing::Slip, &[0x10, SLIP_END, 0x20]).unwrap();
        let mut decoder = FrameDecoder::new(Framing::Slip);

        let (head, tail) = frame.split_at(3);
        decoder.extend(head);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(tail);
        assert_eq!(
            decoder.next_frame().unwrap().unwrap().as_ref(),
            &[0x10, SLIP_END, 0x20]
        );
    }

    #[test]
    fn slip_resynchronizes_after_oversize_frame() {
        let mut decoder = FrameDecoder::with_max_frame(Framing::Slip, 4);
        decoder.extend(&[0x01; 8]);
        decoder.extend(&[SLIP_END]);
        assert!(decoder.next_frame().is_err());

        decoder.extend(&encode_frame(Framing::Slip, b"ok").unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn slip_discards_unterminated_overflow() {
        let mut decoder = FrameDecoder::with_max_frame(Framing::Slip, 4);
        decoder.extend(&[0x01; 16]);
        assert!(decoder.next_frame().is_err());

        decoder.extend(&encode_frame(Framing::Slip, b"ok").unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(encode_frame(Framing::LengthPrefix, &payload).is_err());
        assert!(encode_frame(Framing::Slip, &payload).is_err());
    }
}
