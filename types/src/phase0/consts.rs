use hex_literal::hex;

use crate::phase0::primitives::{Epoch, Slot};

pub const BLS_WITHDRAWAL_PREFIX: &[u8] = &hex!("00");
pub const ETH1_ADDRESS_WITHDRAWAL_PREFIX: &[u8] = &hex!("01");
pub const FAR_FUTURE_EPOCH: Epoch = Epoch::MAX;
pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;
pub const JUSTIFICATION_BITS_LENGTH: usize = 4;
