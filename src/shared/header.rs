//! The 8-byte header prefix shared by every memory-mapped status area
//! (`AFD_WORD_OFFSET` in the original).
//!
//! Layout, matching `original_source/init_afd/afddefs.h`'s comment block
//! byte-for-byte:
//!
//! ```text
//! bytes 0..4   i32   record count, or STALE (-1) once superseded
//! byte  4      u8    edit counter, bumped on every schema-altering change
//! byte  5      u8    feature flags
//! byte  6      u8    reserved
//! byte  7      u8    schema version
//! ```

/// Sentinel written into the count field once an area has been replaced
/// by a newer generation.
pub const STALE: i32 = -1;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaHeader {
    pub count: i32,
    pub edit_counter: u8,
    pub feature_flags: u8,
    pub version: u8,
}

impl AreaHeader {
    pub fn new(count: i32, version: u8) -> Self {
        Self {
            count,
            edit_counter: 0,
            feature_flags: 0,
            version,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.count == STALE
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.count.to_ne_bytes());
        buf[4] = self.edit_counter;
        buf[5] = self.feature_flags;
        buf[6] = 0; // reserved
        buf[7] = self.version;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let count = i32::from_ne_bytes(buf[0..4].try_into().ok()?);
        Some(Self {
            count,
            edit_counter: buf[4],
            feature_flags: buf[5],
            version: buf[7],
        })
    }

    /// Read just the count field — the cheap "is this mapping stale" probe
    /// callers are expected to run before any long-running loop iteration.
    pub fn peek_count(buf: &[u8]) -> Option<i32> {
        if buf.len() < 4 {
            return None;
        }
        Some(i32::from_ne_bytes(buf[0..4].try_into().ok()?))
    }
}
