//! Byte layouts of every device-control request and response.
//!
//! The driver reads these buffers with fixed offsets, so each layout is a
//! frozen contract: ports and values are little-endian, unaligned, and
//! packed back to back with no padding.
//!
//! ```text
//!   read  byte/word   ┌ port u16 ┐                       → value u8 / u16
//!   read  ulong       ┌ port u32 ┐                       → value u32
//!   write byte        ┌ port u16 │ value u8  ┐
//!   write word        ┌ port u16 │ value u16 ┐
//!   write ulong       ┌ port u32 │ value u32 ┐
//!   map / unmap       ┌ handle │ size │ phys addr │ linear addr ┐  (pointer width each)
//! ```

use core::mem::size_of;
use thiserror::Error;

/*──────────────────────────── errors ────────────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("response truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N], WireError> {
    buf.get(..N)
        .and_then(|head| head.try_into().ok())
        .ok_or(WireError::Truncated { expected: N, actual: buf.len() })
}

/*──────────────────────────── port requests ─────────────────────────────*/

pub const BYTE_RESPONSE_LEN: usize = 1;
pub const WORD_RESPONSE_LEN: usize = 2;
pub const ULONG_RESPONSE_LEN: usize = 4;

/// Read request; the same port encodes narrow (byte/word) or wide (ulong).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPortRequest {
    pub port: u16,
}

impl ReadPortRequest {
    /// Layout used by the byte and word reads.
    pub const fn encode(&self) -> [u8; 2] {
        self.port.to_le_bytes()
    }

    /// Layout used by the ulong read: the port zero-extended to 32 bits.
    pub const fn encode_wide(&self) -> [u8; 4] {
        (self.port as u32).to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteByteRequest {
    pub port: u16,
    pub value: u8,
}

impl WriteByteRequest {
    pub const fn encode(&self) -> [u8; 3] {
        let [p0, p1] = self.port.to_le_bytes();
        [p0, p1, self.value]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteWordRequest {
    pub port: u16,
    pub value: u16,
}

impl WriteWordRequest {
    pub const fn encode(&self) -> [u8; 4] {
        let [p0, p1] = self.port.to_le_bytes();
        let [v0, v1] = self.value.to_le_bytes();
        [p0, p1, v0, v1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteUlongRequest {
    pub port: u16,
    pub value: u32,
}

impl WriteUlongRequest {
    pub const fn encode(&self) -> [u8; 8] {
        let [p0, p1, p2, p3] = (self.port as u32).to_le_bytes();
        let [v0, v1, v2, v3] = self.value.to_le_bytes();
        [p0, p1, p2, p3, v0, v1, v2, v3]
    }
}

pub fn decode_byte(buf: &[u8]) -> Result<u8, WireError> {
    take::<BYTE_RESPONSE_LEN>(buf).map(|[b]| b)
}

pub fn decode_word(buf: &[u8]) -> Result<u16, WireError> {
    take::<WORD_RESPONSE_LEN>(buf).map(u16::from_le_bytes)
}

pub fn decode_ulong(buf: &[u8]) -> Result<u32, WireError> {
    take::<ULONG_RESPONSE_LEN>(buf).map(u32::from_le_bytes)
}

/*──────────────────────────── physical memory ───────────────────────────*/

const WORD: usize = size_of::<usize>();

/// Size of the map/unmap structure for the current pointer width.
pub const PHYSICAL_MEMORY_LEN: usize = 4 * WORD;

/// Round-tripped through both map and unmap codes.
///
/// The driver may map a larger, page-aligned region than asked for; it then
/// reports the physical address it actually mapped, and the caller offsets
/// the returned linear base by the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalMemoryRequest {
    pub handle: usize,
    pub size: usize,
    pub physical_address: usize,
    pub linear_address: usize,
}

impl PhysicalMemoryRequest {
    pub fn encode(&self) -> [u8; PHYSICAL_MEMORY_LEN] {
        let mut out = [0u8; PHYSICAL_MEMORY_LEN];
        let fields = [self.handle, self.size, self.physical_address, self.linear_address];
        for (chunk, field) in out.chunks_exact_mut(WORD).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let raw = take::<PHYSICAL_MEMORY_LEN>(buf)?;
        let mut fields = raw.chunks_exact(WORD).map(|chunk| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(chunk);
            usize::from_le_bytes(word)
        });
        let mut next = || fields.next().unwrap_or_default();
        Ok(Self {
            handle: next(),
            size: next(),
            physical_address: next(),
            linear_address: next(),
        })
    }

    /// Linear address of `requested` inside this mapping.
    pub fn linear_for(&self, requested: usize) -> usize {
        self.linear_address
            .wrapping_add(requested.wrapping_sub(self.physical_address))
    }
}
