//! CAN frame representation and payload accessors.
//!
//! The safety logic never reads payload bytes through pointer casts;
//! everything goes through the byte/bit helpers here, with an explicit
//! little-endian `u64` image for bit-packed field access.

use arrayvec::ArrayVec;

/// Classic CAN frame as seen by the gateway: source bus, 11/29-bit
/// address and up to 8 payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanFrame {
    pub bus: u8,
    pub addr: u16,
    payload: ArrayVec<[u8; 8]>,
}

impl CanFrame {
    pub fn new(bus: u8, addr: u16, data: &[u8]) -> Self {
        let mut payload = ArrayVec::new();
        let n = core::cmp::min(data.len(), 8);
        payload.try_extend_from_slice(&data[..n]).ok();
        Self { bus, addr, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Payload byte `i`, or 0 past the end of the frame.
    pub fn byte(&self, i: usize) -> u8 {
        self.payload.get(i).copied().unwrap_or(0)
    }

    pub fn set_byte(&mut self, i: usize, val: u8) {
        if let Some(b) = self.payload.get_mut(i) {
            *b = val;
        }
    }

    /// Payload bit at `pos` (bit 0 = LSB of byte 0).
    pub fn bit(&self, pos: u32) -> bool {
        (self.byte((pos / 8) as usize) >> (pos % 8)) & 1 != 0
    }

    /// Up to 8 payload bytes starting at `start`, read little-endian.
    pub fn bytes(&self, start: usize, len: usize) -> u64 {
        let mut out = 0u64;
        for i in 0..core::cmp::min(len, 8) {
            out |= u64::from(self.byte(start + i)) << (8 * i);
        }
        out
    }

    /// The whole payload as a little-endian `u64` image, zero-padded.
    pub fn payload_u64(&self) -> u64 {
        self.bytes(0, 8)
    }

    /// Write a `u64` image back over the existing payload bytes.
    pub fn set_payload_u64(&mut self, image: u64) {
        let bytes = image.to_le_bytes();
        for i in 0..self.payload.len() {
            self.payload[i] = bytes[i];
        }
    }
}

/// One entry of an outbound allow-list: address, bus and expected length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanMsg {
    pub addr: u16,
    pub bus: u8,
    pub len: u8,
}

/// Outbound allow-list check: the frame's address/bus/length triple must
/// appear verbatim in the table.
pub fn msg_allowed(frame: &CanFrame, table: &[CanMsg]) -> bool {
    table
        .iter()
        .any(|m| m.addr == frame.addr && m.bus == frame.bus && usize::from(m.len) == frame.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_and_bit_accessors() {
        let f = CanFrame::new(0, 832, &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
        assert_eq!(f.byte(0), 0x12);
        assert_eq!(f.byte(7), 0xF0);
        assert_eq!(f.byte(8), 0);
        assert!(f.bit(1)); // 0x12 bit 1
        assert!(!f.bit(0));
        assert_eq!(f.bytes(0, 4), 0x7856_3412);
        assert_eq!(f.bytes(4, 4), 0xF0DE_BC9A);
    }

    #[test]
    fn u64_image_round_trips() {
        let mut f = CanFrame::new(2, 593, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let image = f.payload_u64();
        f.set_payload_u64(image ^ 0xFF00);
        assert_eq!(f.byte(1), 2 ^ 0xFF);
        assert_eq!(f.byte(0), 1);
    }

    #[test]
    fn short_frames_keep_their_length() {
        let mut f = CanFrame::new(0, 1265, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(f.len(), 4);
        f.set_payload_u64(u64::MAX);
        assert_eq!(f.len(), 4);
        assert_eq!(f.byte(4), 0);
    }

    #[test]
    fn allow_list_matches_addr_bus_len() {
        const TABLE: &[CanMsg] = &[CanMsg { addr: 832, bus: 0, len: 8 }];
        assert!(msg_allowed(&CanFrame::new(0, 832, &[0; 8]), TABLE));
        assert!(!msg_allowed(&CanFrame::new(1, 832, &[0; 8]), TABLE));
        assert!(!msg_allowed(&CanFrame::new(0, 832, &[0; 4]), TABLE));
    }
}
