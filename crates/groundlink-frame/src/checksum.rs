use crc::{Crc, CRC_16_MODBUS};

/// CRC-16/MODBUS: reflected poly 0xA001, init 0xFFFF, as used on the RS485 bus.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Checksum over the concatenation of `parts`.
pub fn checksum(parts: &[&[u8]]) -> u16 {
    let mut digest = CRC16.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}
