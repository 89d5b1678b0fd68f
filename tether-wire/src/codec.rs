//! Sans-IO message codec.
//!
//! Framed mode header (5 bytes):
//!
//! ```text
//! +-----+-------+--------+----------------------+
//! | FIN | RSV   | opcode | payload length       |
//! | 1b  | 3b    | 4b     | u32 big-endian       |
//! +-----+-------+--------+----------------------+
//! ```
//!
//! A message is one frame with an opcode of text or binary, followed by zero
//! or more continuation frames; the last frame carries FIN. Frames of two
//! messages never interleave.
//!
//! Raw mode has no framing: whatever one transport read produced is one
//! binary message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tether_core::options::TransportMode;
use tether_core::status::MessageKind;
use thiserror::Error;

/// Frame header length in bytes
pub const HEADER_LEN: usize = 5;

const FIN: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;

/// Wire protocol violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Protocol violation: reserved bits set")]
    ReservedBits,

    #[error("Protocol violation: unknown opcode {0:#x}")]
    UnknownOpcode(u8),

    #[error("Protocol violation: continuation frame outside a message")]
    UnexpectedContinuation,

    #[error("Protocol violation: new message started before the previous one finished")]
    InterleavedMessage,

    #[error("Protocol violation: frame of {size} bytes exceeds {max}")]
    SizeTooLarge { size: usize, max: usize },

    #[error("Stream ended in the middle of a message")]
    UnexpectedEof,
}

impl From<WireError> for tether_core::error::TetherError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::SizeTooLarge { size, max } => Self::MessageTooLarge { size, max },
            other => Self::protocol(other.to_string()),
        }
    }
}

/// Frame opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
}

impl Opcode {
    #[inline]
    pub const fn from_kind(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => Self::Text,
            MessageKind::Binary => Self::Binary,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub len: u32,
}

impl FrameHeader {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `src`.
    ///
    /// Returns `Ok(None)` if `src` is too short.
    pub fn parse(src: &[u8]) -> Result<Option<Self>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let first = src[0];

        // Reserved bits must be zero
        if (first & RSV_MASK) != 0 {
            return Err(WireError::ReservedBits);
        }
        let opcode = Opcode::try_from(first & OPCODE_MASK)?;
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);

        Ok(Some(Self {
            fin: (first & FIN) != 0,
            opcode,
            len,
        }))
    }

    pub fn encode(&self, out: &mut BytesMut) {
        let mut first = self.opcode as u8;
        if self.fin {
            first |= FIN;
        }
        out.put_u8(first);
        out.put_u32(self.len);
    }
}

/// One step of decoding into a caller-provided buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// `count` payload bytes were written to the front of the output slice.
    ///
    /// `count == 0` without `end_of_message` means the output slice was full.
    Chunk {
        count: usize,
        kind: MessageKind,
        end_of_message: bool,
    },
    /// The peer sent a close frame.
    Close,
}

#[derive(Debug, Clone, Copy)]
struct FrameCursor {
    kind: MessageKind,
    fin: bool,
    remaining: usize,
}

/// Stateful frame decoder
///
/// Transport bytes go in through [`feed`](Self::feed); payload bytes come out
/// through [`decode_into`](Self::decode_into), directly into the receive
/// buffer's free space. Headers never reach the output.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: BytesMut,
    cursor: Option<FrameCursor>,
    message: Option<MessageKind>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_len(u32::MAX as usize)
    }

    /// Reject frames whose declared payload exceeds `max`.
    #[must_use]
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            cursor: None,
            message: None,
            max_frame_len: max,
        }
    }

    /// Append transport bytes.
    pub fn feed(&mut self, src: &[u8]) {
        self.pending.extend_from_slice(src);
    }

    /// Returns true between the first frame of a message and its FIN frame.
    #[must_use]
    pub const fn is_mid_message(&self) -> bool {
        self.message.is_some()
    }

    /// Undecoded transport bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Decode as much payload as fits into `out`.
    ///
    /// Returns:
    /// - `Ok(Some(_))` → progress was made (or `out` is full)
    /// - `Ok(None)` → need more transport bytes
    /// - `Err` → protocol violation
    pub fn decode_into(&mut self, out: &mut [u8]) -> Result<Option<Decoded>, WireError> {
        loop {
            let Some(mut cursor) = self.cursor else {
                let Some(header) = FrameHeader::parse(&self.pending)? else {
                    return Ok(None);
                };
                self.pending.advance(HEADER_LEN);

                let kind = match header.opcode {
                    Opcode::Close => {
                        self.message = None;
                        return Ok(Some(Decoded::Close));
                    }
                    Opcode::Continuation => {
                        self.message.ok_or(WireError::UnexpectedContinuation)?
                    }
                    Opcode::Text | Opcode::Binary => {
                        if self.message.is_some() {
                            return Err(WireError::InterleavedMessage);
                        }
                        let kind = if header.opcode == Opcode::Text {
                            MessageKind::Text
                        } else {
                            MessageKind::Binary
                        };
                        self.message = Some(kind);
                        kind
                    }
                };

                let len = header.len as usize;
                if len > self.max_frame_len {
                    return Err(WireError::SizeTooLarge {
                        size: len,
                        max: self.max_frame_len,
                    });
                }
                if len == 0 {
                    if header.fin {
                        self.message = None;
                        return Ok(Some(Decoded::Chunk {
                            count: 0,
                            kind,
                            end_of_message: true,
                        }));
                    }
                    continue;
                }
                self.cursor = Some(FrameCursor {
                    kind,
                    fin: header.fin,
                    remaining: len,
                });
                continue;
            };

            if out.is_empty() {
                return Ok(Some(Decoded::Chunk {
                    count: 0,
                    kind: cursor.kind,
                    end_of_message: false,
                }));
            }
            if self.pending.is_empty() {
                return Ok(None);
            }

            let count = cursor.remaining.min(self.pending.len()).min(out.len());
            out[..count].copy_from_slice(&self.pending[..count]);
            self.pending.advance(count);
            cursor.remaining -= count;

            let end_of_message = cursor.remaining == 0 && cursor.fin;
            if cursor.remaining == 0 {
                self.cursor = None;
                if cursor.fin {
                    self.message = None;
                }
            } else {
                self.cursor = Some(cursor);
            }

            return Ok(Some(Decoded::Chunk {
                count,
                kind: cursor.kind,
                end_of_message,
            }));
        }
    }
}

/// Pass-through decoder: every fed read is one binary message.
#[derive(Debug, Default)]
pub struct RawDecoder {
    pending: BytesMut,
}

impl RawDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, src: &[u8]) {
        self.pending.extend_from_slice(src);
    }

    pub fn decode_into(&mut self, out: &mut [u8]) -> Option<Decoded> {
        if self.pending.is_empty() {
            return None;
        }
        let count = self.pending.len().min(out.len());
        out[..count].copy_from_slice(&self.pending[..count]);
        self.pending.advance(count);
        Some(Decoded::Chunk {
            count,
            kind: MessageKind::Binary,
            end_of_message: self.pending.is_empty(),
        })
    }
}

/// Decoder for either transport mode
#[derive(Debug)]
pub enum Decoder {
    Framed(FrameDecoder),
    Raw(RawDecoder),
}

impl Decoder {
    /// Decoder for `mode`; `max_frame_len` only applies to framed mode.
    #[must_use]
    pub fn new(mode: TransportMode, max_frame_len: Option<usize>) -> Self {
        match mode {
            TransportMode::Framed => Self::Framed(match max_frame_len {
                Some(max) => FrameDecoder::with_max_frame_len(max),
                None => FrameDecoder::new(),
            }),
            TransportMode::Raw => Self::Raw(RawDecoder::new()),
        }
    }

    pub fn feed(&mut self, src: &[u8]) {
        match self {
            Self::Framed(d) => d.feed(src),
            Self::Raw(d) => d.feed(src),
        }
    }

    pub fn decode_into(&mut self, out: &mut [u8]) -> Result<Option<Decoded>, WireError> {
        match self {
            Self::Framed(d) => d.decode_into(out),
            Self::Raw(d) => Ok(d.decode_into(out)),
        }
    }

    #[must_use]
    pub fn is_mid_message(&self) -> bool {
        match self {
            Self::Framed(d) => d.is_mid_message(),
            Self::Raw(_) => false,
        }
    }
}

/// Encode one message for the wire.
///
/// In framed mode a payload longer than `max_frame_payload` is split into
/// continuation frames. In raw mode the payload is returned as-is.
#[must_use]
pub fn encode(
    mode: TransportMode,
    kind: MessageKind,
    payload: Bytes,
    max_frame_payload: Option<usize>,
) -> Bytes {
    if mode == TransportMode::Raw {
        return payload;
    }

    let max = max_frame_payload
        .unwrap_or(u32::MAX as usize)
        .clamp(1, u32::MAX as usize);
    let frames = payload.len().div_ceil(max).max(1);
    let mut out = BytesMut::with_capacity(frames * HEADER_LEN + payload.len());

    let mut opcode = Opcode::from_kind(kind);
    let mut rest = &payload[..];
    loop {
        let take = rest.len().min(max);
        let fin = take == rest.len();
        FrameHeader {
            fin,
            opcode,
            len: take as u32,
        }
        .encode(&mut out);
        out.extend_from_slice(&rest[..take]);
        rest = &rest[take..];
        if fin {
            break;
        }
        opcode = Opcode::Continuation;
    }

    out.freeze()
}

/// Encode a close frame.
#[must_use]
pub fn encode_close() -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN);
    FrameHeader {
        fin: true,
        opcode: Opcode::Close,
        len: 0,
    }
    .encode(&mut out);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut FrameDecoder, out: &mut Vec<u8>) -> Option<(MessageKind, bool)> {
        let mut scratch = [0u8; 7];
        loop {
            match decoder.decode_into(&mut scratch).unwrap()? {
                Decoded::Chunk {
                    count,
                    kind,
                    end_of_message,
                } => {
                    out.extend_from_slice(&scratch[..count]);
                    if end_of_message {
                        return Some((kind, true));
                    }
                }
                Decoded::Close => return None,
            }
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(TransportMode::Framed, MessageKind::Text, Bytes::from_static(b"demo"), None);
        assert_eq!(&bytes[..], &[0x81, 0, 0, 0, 4, b'd', b'e', b'm', b'o']);
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(
            TransportMode::Framed,
            MessageKind::Binary,
            Bytes::from_static(b"hello world"),
            None,
        ));
        let mut out = Vec::new();
        assert_eq!(drain(&mut decoder, &mut out), Some((MessageKind::Binary, true)));
        assert_eq!(out, b"hello world");
        assert!(!decoder.is_mid_message());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_fragmented_message() {
        let payload = Bytes::from(vec![9u8; 25]);
        let wire = encode(TransportMode::Framed, MessageKind::Text, payload.clone(), Some(10));
        // 3 frames: 10 + 10 + 5
        assert_eq!(wire.len(), 3 * HEADER_LEN + 25);
        assert_eq!(wire[0], 0x01);
        assert_eq!(wire[HEADER_LEN + 10], 0x00);
        assert_eq!(wire[2 * (HEADER_LEN + 10)], 0x80);

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        // feed byte by byte
        for b in wire.iter() {
            decoder.feed(std::slice::from_ref(b));
            let mut scratch = [0u8; 4];
            while let Some(Decoded::Chunk { count, end_of_message, .. }) =
                decoder.decode_into(&mut scratch).unwrap()
            {
                out.extend_from_slice(&scratch[..count]);
                if end_of_message {
                    break;
                }
            }
        }
        assert_eq!(out, payload);
        assert!(!decoder.is_mid_message());
    }

    #[test]
    fn test_full_output_reports_zero_chunk() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(TransportMode::Framed, MessageKind::Binary, Bytes::from_static(b"abc"), None));
        let result = decoder.decode_into(&mut []).unwrap();
        assert_eq!(
            result,
            Some(Decoded::Chunk {
                count: 0,
                kind: MessageKind::Binary,
                end_of_message: false
            })
        );
    }

    #[test]
    fn test_empty_message() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode(TransportMode::Framed, MessageKind::Text, Bytes::new(), None));
        let result = decoder.decode_into(&mut [0u8; 8]).unwrap();
        assert_eq!(
            result,
            Some(Decoded::Chunk {
                count: 0,
                kind: MessageKind::Text,
                end_of_message: true
            })
        );
    }

    #[test]
    fn test_close_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode_close());
        assert_eq!(decoder.decode_into(&mut [0u8; 8]).unwrap(), Some(Decoded::Close));
    }

    #[test]
    fn test_incomplete_header() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x82, 0, 0]);
        assert_eq!(decoder.decode_into(&mut [0u8; 8]).unwrap(), None);
    }

    #[test]
    fn test_reserved_bits() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x92, 0, 0, 0, 0]);
        assert_eq!(decoder.decode_into(&mut [0u8; 8]), Err(WireError::ReservedBits));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x83, 0, 0, 0, 0]);
        assert_eq!(decoder.decode_into(&mut [0u8; 8]), Err(WireError::UnknownOpcode(3)));
    }

    #[test]
    fn test_stray_continuation() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x80, 0, 0, 0, 1, b'x']);
        assert_eq!(
            decoder.decode_into(&mut [0u8; 8]),
            Err(WireError::UnexpectedContinuation)
        );
    }

    #[test]
    fn test_interleaved_message() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&[0x01, 0, 0, 0, 1, b'a', 0x82, 0, 0, 0, 0]);
        let mut out = [0u8; 8];
        assert!(decoder.decode_into(&mut out).unwrap().is_some());
        assert!(decoder.is_mid_message());
        assert_eq!(decoder.decode_into(&mut out), Err(WireError::InterleavedMessage));
    }

    #[test]
    fn test_frame_size_limit() {
        let mut decoder = FrameDecoder::with_max_frame_len(4);
        decoder.feed(&[0x82, 0, 0, 0, 5]);
        assert_eq!(
            decoder.decode_into(&mut [0u8; 8]),
            Err(WireError::SizeTooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_size_error_maps_to_message_too_large() {
        let err: tether_core::error::TetherError = WireError::SizeTooLarge { size: 5, max: 4 }.into();
        assert!(matches!(
            err,
            tether_core::error::TetherError::MessageTooLarge { size: 5, max: 4 }
        ));
        let err: tether_core::error::TetherError = WireError::ReservedBits.into();
        assert!(!matches!(err, tether_core::error::TetherError::MessageTooLarge { .. }));
    }

    #[test]
    fn test_raw_mode() {
        let payload = Bytes::from_static(b"raw bytes");
        assert_eq!(
            encode(TransportMode::Raw, MessageKind::Text, payload.clone(), Some(2)),
            payload
        );

        let mut decoder = Decoder::new(TransportMode::Raw, None);
        decoder.feed(b"abcdef");
        let mut out = [0u8; 4];
        assert_eq!(
            decoder.decode_into(&mut out).unwrap(),
            Some(Decoded::Chunk {
                count: 4,
                kind: MessageKind::Binary,
                end_of_message: false
            })
        );
        assert_eq!(
            decoder.decode_into(&mut out).unwrap(),
            Some(Decoded::Chunk {
                count: 2,
                kind: MessageKind::Binary,
                end_of_message: true
            })
        );
        assert_eq!(decoder.decode_into(&mut out).unwrap(), None);
    }
}
