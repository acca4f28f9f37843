//! Telemetry packet shape: a 14-byte header followed by up to 16 8-byte
//! per-task entries, all fixed layout.

use crate::{TaskEntry, TelemetryHeader};
use zerocopy::{AsBytes, U32};

pub const PACKET_TYPE_VITALS: u8 = 1;
pub const MAX_TASKS: usize = 16;
pub const HEADER_LEN: usize = core::mem::size_of::<TelemetryHeader>();
pub const ENTRY_LEN: usize = core::mem::size_of::<TaskEntry>();
pub const MAX_PACKET_LEN: usize = HEADER_LEN + MAX_TASKS * ENTRY_LEN;

static_assertions::const_assert_eq!(HEADER_LEN, 14);
static_assertions::const_assert_eq!(ENTRY_LEN, 8);

/// Serializes a header and up to [`MAX_TASKS`] entries into `out`, clamping
/// (not erroring on) an oversize `entries` slice. Returns the number of
/// bytes written, or `None` if `out` is too small.
pub fn encode(
    timestamp_ticks: u32,
    free_heap: u32,
    min_free_heap: u32,
    entries: &[TaskEntry],
    out: &mut [u8],
) -> Option<usize> {
    let task_count = entries.len().min(MAX_TASKS);
    let header = TelemetryHeader {
        packet_type: PACKET_TYPE_VITALS,
        timestamp_ticks: U32::new(timestamp_ticks),
        free_heap: U32::new(free_heap),
        min_free_heap: U32::new(min_free_heap),
        task_count: task_count as u8,
    };

    let total = HEADER_LEN + task_count * ENTRY_LEN;
    if out.len() < total {
        return None;
    }

    out[..HEADER_LEN].copy_from_slice(header.as_bytes());
    let mut pos = HEADER_LEN;
    for entry in &entries[..task_count] {
        out[pos..pos + ENTRY_LEN].copy_from_slice(entry.as_bytes());
        pos += ENTRY_LEN;
    }

    Some(pos)
}

pub fn decode_header(data: &[u8]) -> Option<TelemetryHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }
    TelemetryHeader::read_from(&data[..HEADER_LEN])
}

pub fn decode_entry(data: &[u8], index: usize) -> Option<TaskEntry> {
    let start = HEADER_LEN + index * ENTRY_LEN;
    let end = start + ENTRY_LEN;
    if data.len() < end {
        return None;
    }
    TaskEntry::read_from(&data[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::byteorder::U16;
    use zerocopy::FromBytes;

    fn entry(n: u8, cpu_pct: u8) -> TaskEntry {
        TaskEntry {
            task_number: n,
            state: 0,
            priority: 1,
            stack_hwm: U16::new(128),
            cpu_pct,
            runtime_ms: U16::new(500),
        }
    }

    #[test]
    fn header_is_fourteen_bytes() {
        assert_eq!(HEADER_LEN, 14);
    }

    #[test]
    fn packet_length_matches_task_count() {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let entries = [entry(0, 10), entry(1, 90)];
        let n = encode(1000, 4096, 4000, &entries, &mut buf).unwrap();
        assert_eq!(n, 14 + 8 * 2);
        let hdr = decode_header(&buf).unwrap();
        assert_eq!(hdr.task_count, 2);
        assert_eq!(hdr.packet_type, PACKET_TYPE_VITALS);
    }

    #[test]
    fn exceeding_cap_is_truncated() {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let entries: heapless::Vec<TaskEntry, 32> =
            (0..20u8).map(|i| entry(i, 0)).collect();
        let n = encode(0, 0, 0, &entries, &mut buf).unwrap();
        let hdr = decode_header(&buf[..n]).unwrap();
        assert_eq!(hdr.task_count, MAX_TASKS as u8);
        assert_eq!(n, HEADER_LEN + MAX_TASKS * ENTRY_LEN);
    }

    #[test]
    fn entries_round_trip() {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let entries = [entry(3, 55)];
        let n = encode(1, 2, 3, &entries, &mut buf).unwrap();
        let decoded = decode_entry(&buf[..n], 0).unwrap();
        assert_eq!(decoded, entries[0]);
    }
}
