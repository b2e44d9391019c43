//! Little-endian wire primitives shared by the dispatcher and the handlers.
//!
//! Econet fileserver payloads are little-endian byte soup: addresses are
//! four bytes, lengths are usually three, text is CR-terminated and names
//! are space-padded to fixed widths. The helpers here come in two flavours:
//! sequential readers/writers over [`Read`]/[`Write`] and positional
//! accessors over a raw payload slice.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Terminator used by clients for textual arguments.
pub const CR: u8 = 0x0d;

/// Reads a `u8` from the source.
pub fn read_u8(src: &mut impl Read) -> io::Result<u8> {
    src.read_u8()
}

/// Reads a little-endian `u16` from the source.
pub fn read_u16(src: &mut impl Read) -> io::Result<u16> {
    src.read_u16::<LittleEndian>()
}

/// Reads a little-endian 24-bit quantity from the source.
pub fn read_u24(src: &mut impl Read) -> io::Result<u32> {
    src.read_u24::<LittleEndian>()
}

/// Reads a little-endian `u32` from the source.
pub fn read_u32(src: &mut impl Read) -> io::Result<u32> {
    src.read_u32::<LittleEndian>()
}

/// Writes a `u8` to the destination.
pub fn u8(dest: &mut impl Write, v: u8) -> io::Result<()> {
    dest.write_u8(v)
}

/// Writes a little-endian `u16` to the destination.
pub fn u16(dest: &mut impl Write, v: u16) -> io::Result<()> {
    dest.write_u16::<LittleEndian>(v)
}

/// Writes a little-endian 24-bit quantity to the destination.
pub fn u24(dest: &mut impl Write, v: u32) -> io::Result<()> {
    dest.write_u24::<LittleEndian>(v & 0xff_ffff)
}

/// Writes a little-endian `u32` to the destination.
pub fn u32(dest: &mut impl Write, v: u32) -> io::Result<()> {
    dest.write_u32::<LittleEndian>(v)
}

/// Fetches the byte at `at`, if the payload is long enough.
pub fn u8_at(data: &[u8], at: usize) -> Option<u8> {
    data.get(at).copied()
}

/// Fetches the little-endian `u16` starting at `at`.
pub fn u16_at(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Fetches the little-endian 24-bit quantity starting at `at`.
pub fn u24_at(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 3)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

/// Fetches the little-endian `u32` starting at `at`.
pub fn u32_at(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Extracts a textual argument starting at `at`, ending at the first CR or
/// the end of the payload. Clients terminate command tails with 0x0D but
/// not all of them bother when the argument fills the packet.
pub fn cr_string(data: &[u8], at: usize) -> String {
    let tail = data.get(at..).unwrap_or(&[]);
    let end = tail.iter().position(|&b| b == CR).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

/// Space-pads (or truncates) `s` to exactly `width` bytes.
pub fn padded(s: &str, width: usize) -> String {
    let mut out: String = s.chars().take(width).collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

/// Appends `s` space-padded to `width` bytes onto a reply under construction.
pub fn push_padded(dest: &mut Vec<u8>, s: &str, width: usize) {
    dest.extend_from_slice(padded(s, width).as_bytes());
}
