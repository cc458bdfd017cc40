// #![deny(warnings)]

#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

mod asn1;
pub mod constants;
pub(crate) mod crypto;
pub mod error;
pub mod keytab;
pub mod proto;

use bytes::{Buf, BytesMut};
use proto::{ApReq, ApResponse};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{error, trace};

use crate::constants::DEFAULT_IO_MAX_SIZE;

const LENGTH_PREFIX_LEN: usize = 4;

/// RFC4120 7.2.2, each message on a TCP stream is preceded by its length as a
/// four byte big endian integer. The high bit is reserved and must be zero.
fn decode_frame(buf: &mut BytesMut, max_size: usize) -> io::Result<Option<BytesMut>> {
    let Some(prefix) = buf.get(..LENGTH_PREFIX_LEN) else {
        return Ok(None);
    };

    let mut len_bytes = [0u8; LENGTH_PREFIX_LEN];
    len_bytes.copy_from_slice(prefix);
    let frame_len = u32::from_be_bytes(len_bytes);

    if frame_len & 0x8000_0000 != 0 {
        error!(frame_len, "reserved length bit set");
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "reserved length bit set",
        ));
    }

    let frame_len = frame_len as usize;
    if frame_len > max_size {
        error!(frame_len, max_size, "frame too large");
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }

    if buf.len() < LENGTH_PREFIX_LEN + frame_len {
        buf.reserve(LENGTH_PREFIX_LEN + frame_len - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_LEN);
    Ok(Some(buf.split_to(frame_len)))
}

fn encode_frame(der_bytes: &[u8], max_size: usize, buf: &mut BytesMut) -> io::Result<()> {
    if der_bytes.len() > max_size {
        error!(len = der_bytes.len(), max_size, "frame too large");
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
    }

    let d_len = u32::try_from(der_bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;

    buf.reserve(LENGTH_PREFIX_LEN + der_bytes.len());
    buf.extend_from_slice(&d_len.to_be_bytes());
    buf.extend_from_slice(der_bytes);
    Ok(())
}

/// Service side of an AP exchange over TCP.
pub struct ApTcpCodec {
    max_size: usize,
}

impl ApTcpCodec {
    pub fn new(max_size: usize) -> Self {
        ApTcpCodec { max_size }
    }
}

impl Default for ApTcpCodec {
    fn default() -> Self {
        ApTcpCodec {
            max_size: DEFAULT_IO_MAX_SIZE,
        }
    }
}

impl Decoder for ApTcpCodec {
    type Item = ApReq;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = decode_frame(buf, self.max_size)? else {
            return Ok(None);
        };

        trace!(frame_len = frame.len(), "ap-req frame");

        ApReq::from_der(&frame)
            .map(Some)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err)))
    }
}

impl Encoder<ApResponse> for ApTcpCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: ApResponse, buf: &mut BytesMut) -> io::Result<()> {
        let der_bytes = msg
            .to_der()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("{:?}", err)))?;

        encode_frame(&der_bytes, self.max_size, buf)
    }
}

/// Client side of an AP exchange over TCP.
pub struct ApClientTcpCodec {
    max_size: usize,
}

impl Default for ApClientTcpCodec {
    fn default() -> Self {
        ApClientTcpCodec {
            max_size: DEFAULT_IO_MAX_SIZE,
        }
    }
}

impl Decoder for ApClientTcpCodec {
    type Item = ApResponse;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = decode_frame(buf, self.max_size)? else {
            return Ok(None);
        };

        ApResponse::from_der(&frame)
            .map(Some)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err)))
    }
}

impl Encoder<ApReq> for ApClientTcpCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: ApReq, buf: &mut BytesMut) -> io::Result<()> {
        let der_bytes = msg
            .to_der()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("{:?}", err)))?;

        encode_frame(&der_bytes, self.max_size, buf)
    }
}
