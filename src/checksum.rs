//! CRC16-CCITT-FALSE
//!
//! Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
//! This is the integrity code the e-ink firmware checks on every fragment.
//! The `crc` catalog lists it as CRC-16/IBM-3740.

use crc::{Crc, CRC_16_IBM_3740};

const CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC16-CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CCITT_FALSE.checksum(data)
}

/// CRC16 of several slices taken back to back.
///
/// Lets the packet codec checksum the header and chunk without
/// concatenating them.
pub fn crc16_parts(parts: &[&[u8]]) -> u16 {
    let mut digest = CCITT_FALSE.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}
