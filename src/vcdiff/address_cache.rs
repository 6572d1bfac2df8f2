// VCDIFF address cache (RFC 3284, Section 5.3), decode side.
//
// Default configuration (s_near=4, s_same=3) gives 9 address modes:
//   0      VCD_SELF  absolute
//   1      VCD_HERE  here - value
//   2..=5  NEAR      near[mode - 2] + value
//   6..=8  SAME      same[(mode - 6) * 256 + byte]

use super::varint;

pub const VCD_SELF: u8 = 0;
pub const VCD_HERE: u8 = 1;

const NEAR_SLOTS: usize = 4;
const SAME_GROUPS: usize = 3;
const SAME_START: usize = 2 + NEAR_SLOTS;
const SAME_LEN: usize = SAME_GROUPS * 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressCacheError {
    /// Not enough bytes in the address section.
    #[error("address section underflow")]
    AddrUnderflow,
    /// Decoded address is out of range or overflowed.
    #[error("invalid COPY address")]
    InvalidAddr,
    #[error("invalid address mode {0}")]
    InvalidMode(u8),
}

/// NEAR/SAME address cache. Reset at the start of every window.
#[derive(Clone)]
pub struct AddressCache {
    near: [u64; NEAR_SLOTS],
    same: Box<[u64; SAME_LEN]>,
    next_slot: usize,
}

impl AddressCache {
    pub fn new() -> Self {
        Self {
            near: [0; NEAR_SLOTS],
            same: Box::new([0; SAME_LEN]),
            next_slot: 0,
        }
    }

    pub fn reset(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % NEAR_SLOTS;
        self.same[(addr % SAME_LEN as u64) as usize] = addr;
    }

    /// Decode a COPY address.
    ///
    /// `addr_data` is the unread part of the address section and `here` the
    /// current position in the combined copy-window + target address space.
    /// Returns `(address, bytes_consumed)`; the address is always `< here`.
    pub fn decode(
        &mut self,
        mode: u8,
        addr_data: &[u8],
        here: u64,
    ) -> Result<(u64, usize), AddressCacheError> {
        let slot = mode as usize;
        let (addr, consumed) = if slot < SAME_START {
            let (raw, consumed) =
                varint::read_u64(addr_data).map_err(|_| AddressCacheError::AddrUnderflow)?;
            let addr = match mode {
                VCD_SELF => raw,
                VCD_HERE => here
                    .checked_sub(raw)
                    .ok_or(AddressCacheError::InvalidAddr)?,
                _ => self.near[slot - 2]
                    .checked_add(raw)
                    .ok_or(AddressCacheError::InvalidAddr)?,
            };
            (addr, consumed)
        } else if slot < SAME_START + SAME_GROUPS {
            let &byte = addr_data.first().ok_or(AddressCacheError::AddrUnderflow)?;
            let addr = self.same[(slot - SAME_START) * 256 + byte as usize];
            (addr, 1)
        } else {
            return Err(AddressCacheError::InvalidMode(mode));
        };

        if addr >= here {
            return Err(AddressCacheError::InvalidAddr);
        }

        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}
