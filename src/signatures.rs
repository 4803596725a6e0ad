use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::address::Address;
use crate::error::TransactionError;
use crate::instruction::Instruction;

/// An ed25519 signing key together with its public identity.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    /// Loads the 64-byte `secret || public` form used in key files.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; 64] = bytes.try_into().ok()?;
        SigningKey::from_keypair_bytes(bytes).ok().map(Self)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_keypair_bytes()
    }

    pub fn address(&self) -> Address {
        Address(self.0.verifying_key().to_bytes())
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message).to_bytes())
    }
}

impl Default for Keypair {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Keypair").field(&self.address()).finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn verify(&self, signer: &Address, message: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&signer.0) else {
            return false;
        };
        key.verify(message, &ed25519_dalek::Signature::from_bytes(&self.0))
            .is_ok()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// What gets signed: the fee payer and the ordered instructions.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Message {
    pub fee_payer: Address,
    pub instructions: Vec<Instruction>,
}

impl Message {
    /// Serializes the message into the canonical bytes that get signed.
    pub fn to_message_bytes(&self) -> Vec<u8> {
        // Vec-backed writer cannot fail.
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Every address an instruction marks as signer, fee payer first, deduplicated.
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = vec![self.fee_payer];
        for meta in self.instructions.iter().flat_map(|ix| ix.accounts.iter()) {
            if meta.is_signer && !signers.contains(&meta.address) {
                signers.push(meta.address);
            }
        }
        signers
    }
}

/// An ordered group of instructions applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub message: Message,
    pub signatures: Vec<(Address, Signature)>,
}

impl Transaction {
    pub fn new(fee_payer: Address, instructions: Vec<Instruction>) -> Self {
        Self {
            message: Message {
                fee_payer,
                instructions,
            },
            signatures: Vec::new(),
        }
    }

    /// Signs with every keypair given. Extra keypairs are ignored.
    pub fn sign(&mut self, keypairs: &[&Keypair]) {
        let bytes = self.message.to_message_bytes();
        let required = self.message.required_signers();
        self.signatures = keypairs
            .iter()
            .filter(|kp| required.contains(&kp.address()))
            .map(|kp| (kp.address(), kp.sign_message(&bytes)))
            .collect();
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.message.instructions
    }

    /// Verifies every attached signature and returns the set of proven signers.
    pub fn verify(&self) -> Result<Vec<Address>, TransactionError> {
        let bytes = self.message.to_message_bytes();
        let mut signers = Vec::with_capacity(self.signatures.len());
        for (address, signature) in &self.signatures {
            if !signature.verify(address, &bytes) {
                return Err(TransactionError::SignatureFailure(*address));
            }
            signers.push(*address);
        }
        if !signers.contains(&self.message.fee_payer) {
            return Err(TransactionError::MissingFeePayerSignature(
                self.message.fee_payer,
            ));
        }
        Ok(signers)
    }
}
