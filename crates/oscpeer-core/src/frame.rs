//! OSC stream framing
//!
//! UDP needs no framing: the datagram boundary is the packet boundary. On a
//! TCP stream the packet boundary must be recovered, and the two OSC
//! versions frame differently:
//!
//! - **OSC 1.1**: each packet is preceded by a 4-byte big-endian length
//!   prefix.
//! - **OSC 1.0**: SLIP (RFC 1055). `END` (0xC0) delimits packets; `ESC`
//!   (0xDB) followed by `ESC_END` (0xDC) or `ESC_ESC` (0xDD) escapes
//!   occurrences of `END`/`ESC` inside the payload. Frames are sent
//!   double-ENDed so a leading delimiter flushes line noise.
//!
//! Decoders buffer partial frames across reads and yield zero or more
//! complete payloads per call.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// SLIP frame delimiter
pub const SLIP_END: u8 = 0xC0;
/// SLIP escape byte
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped `END`
pub const SLIP_ESC_END: u8 = 0xDC;
/// Escaped `ESC`
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// OSC framing version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// OSC 1.0: SLIP framing on TCP streams
    #[default]
    Osc10,
    /// OSC 1.1: 4-byte big-endian length prefix on TCP streams
    Osc11,
}

impl Framing {
    /// Frame a packet payload for a TCP stream
    pub fn encode_frame(&self, payload: &[u8]) -> Bytes {
        match self {
            Framing::Osc11 => {
                let mut buf = BytesMut::with_capacity(4 + payload.len());
                buf.put_u32(payload.len() as u32);
                buf.extend_from_slice(payload);
                buf.freeze()
            }
            Framing::Osc10 => {
                let mut buf = BytesMut::with_capacity(payload.len() + 2);
                buf.put_u8(SLIP_END);
                for &byte in payload {
                    match byte {
                        SLIP_END => {
                            buf.put_u8(SLIP_ESC);
                            buf.put_u8(SLIP_ESC_END);
                        }
                        SLIP_ESC => {
                            buf.put_u8(SLIP_ESC);
                            buf.put_u8(SLIP_ESC_ESC);
                        }
                        other => buf.put_u8(other),
                    }
                }
                buf.put_u8(SLIP_END);
                buf.freeze()
            }
        }
    }

    /// Create a stream decoder for this framing
    pub fn decoder(&self, max_frame_size: usize) -> FrameDecoder {
        match self {
            Framing::Osc11 => FrameDecoder::LengthPrefixed(LengthPrefixedDecoder {
                buf: BytesMut::with_capacity(8192),
                max_frame_size,
            }),
            Framing::Osc10 => FrameDecoder::Slip(SlipDecoder {
                buf: BytesMut::with_capacity(8192),
                max_frame_size,
            }),
        }
    }
}

/// Incremental frame decoder over a byte stream
#[derive(Debug)]
pub enum FrameDecoder {
    LengthPrefixed(LengthPrefixedDecoder),
    Slip(SlipDecoder),
}

impl FrameDecoder {
    /// Feed received bytes into the decoder
    pub fn extend(&mut self, data: &[u8]) {
        match self {
            FrameDecoder::LengthPrefixed(d) => d.buf.extend_from_slice(data),
            FrameDecoder::Slip(d) => d.buf.extend_from_slice(data),
        }
    }

    /// Extract the next complete frame, if any
    ///
    /// An error means the stream is corrupt; the connection should be
    /// dropped.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match self {
            FrameDecoder::LengthPrefixed(d) => d.next_frame(),
            FrameDecoder::Slip(d) => d.next_frame(),
        }
    }
}

/// Length-prefix decoder (OSC 1.1)
#[derive(Debug)]
pub struct LengthPrefixedDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl LengthPrefixedDecoder {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = (&self.buf[..4]).get_u32() as usize;
        if len > self.max_frame_size {
            return Err(Error::FrameTooLarge(len, self.max_frame_size));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        self.buf.advance(4);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

/// SLIP decoder (OSC 1.0)
#[derive(Debug)]
pub struct SlipDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl SlipDecoder {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            let Some(end) = self.buf.iter().position(|&b| b == SLIP_END) else {
                // no delimiter yet; the escaped form of a max-size frame is
                // at most twice the payload
                if self.buf.len() > self.max_frame_size * 2 {
                    return Err(Error::FrameTooLarge(self.buf.len(), self.max_frame_size));
                }
                return Ok(None);
            };

            let raw = self.buf.split_to(end);
            self.buf.advance(1);

            // back-to-back delimiters produce empty frames; skip them
            if raw.is_empty() {
                continue;
            }

            let mut payload = BytesMut::with_capacity(raw.len());
            let mut bytes = raw.iter();
            while let Some(&byte) = bytes.next() {
                if byte != SLIP_ESC {
                    payload.put_u8(byte);
                    continue;
                }
                match bytes.next() {
                    Some(&SLIP_ESC_END) => payload.put_u8(SLIP_END),
                    Some(&SLIP_ESC_ESC) => payload.put_u8(SLIP_ESC),
                    Some(&other) => {
                        return Err(Error::Framing(format!(
                            "invalid SLIP escape 0x{:02x}",
                            other
                        )))
                    }
                    None => return Err(Error::Framing("dangling SLIP escape".to_string())),
                }
            }

            if payload.len() > self.max_frame_size {
                return Err(Error::FrameTooLarge(payload.len(), self.max_frame_size));
            }
            return Ok(Some(payload.freeze()));
        }
    }
}
