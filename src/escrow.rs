use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;

use crate::address::Address;
use crate::error::EscrowError;

// The durable record of one trade, stored in an account owned by the escrow program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub is_initialized: bool,
    pub initializer: Address,                // Signer who opened the trade; receives rent back
    pub temp_holding_account: Address,       // Token account custodying the deposit
    pub initializer_receive_account: Address, // Where the counterparty's payment must land
    pub expected_amount: u64,                // Units of the counterparty's asset required
}

/// Lifecycle of an escrow record as observed on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowState {
    Uninitialized,
    Initialized,
    Closed,
}

impl EscrowRecord {
    /// 1 (flag) + 32 * 3 (identities) + 8 (amount).
    pub const LEN: usize = 1 + 32 * 3 + 8;

    pub fn new(
        initializer: Address,
        temp_holding_account: Address,
        initializer_receive_account: Address,
        expected_amount: u64,
    ) -> Self {
        Self {
            is_initialized: true,
            initializer,
            temp_holding_account,
            initializer_receive_account,
            expected_amount,
        }
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.is_initialized as u8;
        out[1..33].copy_from_slice(self.initializer.as_ref());
        out[33..65].copy_from_slice(self.temp_holding_account.as_ref());
        out[65..97].copy_from_slice(self.initializer_receive_account.as_ref());
        out[97..105].copy_from_slice(&self.expected_amount.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, EscrowError> {
        if data.len() != Self::LEN {
            return Err(EscrowError::MalformedRecord(data.len()));
        }
        Self::try_from_slice(data).map_err(|_| EscrowError::MalformedRecord(data.len()))
    }

    /// State of a record given the raw contents of its account, if it exists.
    pub fn state_of(data: Option<&[u8]>) -> Result<EscrowState, EscrowError> {
        match data {
            None => Ok(EscrowState::Closed),
            Some(bytes) if Self::decode(bytes)?.is_initialized => Ok(EscrowState::Initialized),
            Some(_) => Ok(EscrowState::Uninitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EscrowRecord {
        EscrowRecord::new(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
            100,
        )
    }

    #[test]
    fn layout_is_fixed() {
        let record = sample();
        let bytes = record.encode();
        assert_eq!(bytes.len(), 105);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..33], record.initializer.as_ref());
        assert_eq!(&bytes[33..65], record.temp_holding_account.as_ref());
        assert_eq!(&bytes[65..97], record.initializer_receive_account.as_ref());
        assert_eq!(&bytes[97..], &100u64.to_le_bytes());
    }

    #[test]
    fn manual_layout_agrees_with_borsh() {
        let record = sample();
        assert_eq!(borsh::to_vec(&record).unwrap(), record.encode().to_vec());
        assert_eq!(EscrowRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            EscrowRecord::decode(&[0u8; 104]),
            Err(EscrowError::MalformedRecord(104))
        );
        assert_eq!(
            EscrowRecord::decode(&[0u8; 106]),
            Err(EscrowError::MalformedRecord(106))
        );
    }

    #[test]
    fn decode_rejects_bad_flag() {
        let mut bytes = sample().encode();
        bytes[0] = 2;
        assert!(EscrowRecord::decode(&bytes).is_err());
    }

    #[test]
    fn state_follows_flag_and_presence() {
        let zeroed = [0u8; EscrowRecord::LEN];
        assert_eq!(EscrowRecord::state_of(Some(&zeroed)), Ok(EscrowState::Uninitialized));
        assert_eq!(
            EscrowRecord::state_of(Some(&sample().encode())),
            Ok(EscrowState::Initialized)
        );
        assert_eq!(EscrowRecord::state_of(None), Ok(EscrowState::Closed));
    }
}
