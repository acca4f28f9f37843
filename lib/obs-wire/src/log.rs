//! Log packet shape: `[u32 token][u8 (level<<4)|argc][args...]`.

use crate::{decode_varint, encode_varint, fnv1a_32, zigzag_decode, zigzag_encode};

/// Maximum number of arguments a single log call may carry. Calls that
/// exceed this are clamped: `OversizePacket` in the spec's error taxonomy.
pub const MAX_ARGS: usize = 8;

/// Worst case: 4-byte token + 1-byte level/argc + 8 args * 5 bytes (a
/// 5-byte varint is the widest an argument gets; floats are 4 bytes).
pub const MAX_PACKET_LEN: usize = 4 + 1 + MAX_ARGS * crate::MAX_VARINT_LEN;

/// Scratch buffer size call sites stack-allocate to serialize into before
/// handing the packet to the channel driver.
pub const SCRATCH_LEN: usize = 64;

static_assertions::const_assert!(SCRATCH_LEN >= MAX_PACKET_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

/// A single tagged log argument. The source-side call site tags each
/// argument as either a signed 32-bit integer or an IEEE-754 float; this
/// crate never infers the tag from the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
}

/// Serializes a log event into `out`, returning the number of bytes
/// written, or `None` if `out` was too small for even the header.
///
/// Argument counts beyond [`MAX_ARGS`] are silently truncated (the spec's
/// `OversizePacket` kind); this never panics.
pub fn encode(fmt: &str, level: Level, args: &[Arg], out: &mut [u8]) -> Option<usize> {
    if out.len() < 5 {
        return None;
    }

    let token = fnv1a_32(fmt.as_bytes());
    out[0..4].copy_from_slice(&token.to_le_bytes());

    let argc = args.len().min(MAX_ARGS);
    out[4] = ((level as u8) << 4) | (argc as u8);

    let mut pos = 5;
    for arg in &args[..argc] {
        let written = match *arg {
            Arg::Int(n) => {
                let u = zigzag_encode(n);
                let remaining = out.len().checked_sub(pos)?;
                if remaining < crate::MAX_VARINT_LEN {
                    return None;
                }
                encode_varint(u, &mut out[pos..])
            }
            Arg::Float(f) => {
                if out.len() - pos < 4 {
                    return None;
                }
                out[pos..pos + 4].copy_from_slice(&f.to_le_bits().to_le_bytes());
                4
            }
        };
        pos += written;
    }

    Some(pos)
}

/// A fully decoded log packet, used by host-side tooling and tests; the
/// device never decodes its own packets.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub token: u32,
    pub level: u8,
    pub argc: u8,
}

pub fn decode_header(data: &[u8]) -> Option<Decoded> {
    if data.len() < 5 {
        return None;
    }
    let token = u32::from_le_bytes(data[0..4].try_into().ok()?);
    let level_argc = data[4];
    Some(Decoded {
        token,
        level: level_argc >> 4,
        argc: level_argc & 0x0f,
    })
}

/// Decodes the trailing argument stream, given the declared `argc` and a
/// per-argument type tag supplied out of band (the token database knows, at
/// build time, which arguments in a given format string are floats).
///
/// Returns `None` on truncated input.
pub fn decode_args<'a>(
    mut data: &'a [u8],
    is_float: impl Fn(usize) -> bool,
    argc: u8,
) -> Option<heapless::Vec<Arg, MAX_ARGS>> {
    let mut out = heapless::Vec::new();
    for i in 0..argc as usize {
        if is_float(i) {
            if data.len() < 4 {
                return None;
            }
            let bits = u32::from_le_bytes(data[0..4].try_into().ok()?);
            out.push(Arg::Float(f32::from_bits(bits))).ok()?;
            data = &data[4..];
        } else {
            let (u, n) = decode_varint(data)?;
            out.push(Arg::Int(zigzag_decode(u))).ok()?;
            data = &data[n..];
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_arg_packet_shape() {
        let mut buf = [0u8; SCRATCH_LEN];
        let n = encode("boot", Level::Info, &[], &mut buf).unwrap();
        assert_eq!(n, 5);
        let hdr = decode_header(&buf[..n]).unwrap();
        assert_eq!(hdr.token, fnv1a_32(b"boot"));
        assert_eq!(hdr.level, Level::Info as u8);
        assert_eq!(hdr.argc, 0);
    }

    #[test]
    fn packet_length_matches_arg_widths() {
        let mut buf = [0u8; SCRATCH_LEN];
        let args = [Arg::Int(42), Arg::Float(1.5), Arg::Int(-1)];
        let n = encode("x={} y={} z={}", Level::Debug, &args, &mut buf).unwrap();
        let hdr = decode_header(&buf[..n]).unwrap();
        assert_eq!(hdr.argc, 3);
        assert_eq!(hdr.level, Level::Debug as u8);
        // 42 zigzags to 84 (1 byte), 1.5f32 is 4 bytes, -1 zigzags to 1 (1 byte)
        assert_eq!(n, 5 + 1 + 4 + 1);
    }

    #[test]
    fn oversize_arg_list_is_truncated_not_rejected() {
        let mut buf = [0u8; SCRATCH_LEN];
        let args = [Arg::Int(0); 12];
        let n = encode("many", Level::Warn, &args, &mut buf).unwrap();
        let hdr = decode_header(&buf[..n]).unwrap();
        assert_eq!(hdr.argc, MAX_ARGS as u8);
    }

    #[test]
    fn args_round_trip() {
        let mut buf = [0u8; SCRATCH_LEN];
        let args = [Arg::Int(-12345), Arg::Float(3.25), Arg::Int(7)];
        let n = encode("a{} b{} c{}", Level::Error, &args, &mut buf).unwrap();
        let hdr = decode_header(&buf[..n]).unwrap();
        let decoded = decode_args(&buf[5..n], |i| i == 1, hdr.argc).unwrap();
        assert_eq!(decoded.as_slice(), &args);
    }
}
