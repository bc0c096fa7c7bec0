//! Byte and compute unit conversions.
//!
//! Sizes enter the public API in MiB/GiB and are carried internally in
//! bytes; CPU reservations are in milli-CPU, where 1000 milli-CPU equals
//! one core's full-second compute.

/// Bytes per MiB.
pub const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Bytes per GiB.
pub const BYTES_PER_GIB: u64 = 1024 * BYTES_PER_MIB;

/// Milli-CPU units per core.
pub const MILLI_CPU_PER_CORE: u64 = 1000;

/// RAM footprint, in bytes, of one payload byte of a virtual instruction.
pub const INSTRUCTION_BYTE_FOOTPRINT: u64 = 100_000;

/// Bandwidth, in MiB/s, of the loopback port every node carries.
pub const LOOPBACK_BANDWIDTH_MIB: u64 = 10_000;

/// Convert MiB to bytes.
pub const fn mib_to_bytes(mib: u64) -> u64 {
    mib * BYTES_PER_MIB
}

/// Convert GiB to bytes.
pub const fn gib_to_bytes(gib: u64) -> u64 {
    gib * BYTES_PER_GIB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(mib_to_bytes(1), 1_048_576);
        assert_eq!(gib_to_bytes(2), 2_147_483_648);
    }
}
