use crate::crypto::stealth::StealthAddress;
use crate::crypto::PublicKey;
use crate::error::WalletError;
use crate::types::{Amount, OutputType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// pay-to-key address
    Transparent(PublicKey),
    /// scan and spend keys for one-time output derivation
    Stealth(StealthAddress),
}

impl Destination {
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Transparent(_) => "transparent address",
            Destination::Stealth(_) => "stealth address",
        }
    }

    pub fn accepts(&self, output_type: OutputType) -> bool {
        matches!(
            (self, output_type),
            (Destination::Transparent(_), OutputType::Transparent)
                | (
                    Destination::Stealth(_),
                    OutputType::Hidden | OutputType::Anonymous
                )
        )
    }
}

/// One intended payment. Only constructible for a destination that can
/// receive `output_type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDescriptor {
    destination: Destination,
    amount: Amount,
    output_type: OutputType,
}

impl OutputDescriptor {
    pub fn new(
        destination: Destination,
        amount: Amount,
        output_type: OutputType,
    ) -> Result<Self, WalletError> {
        if !destination.accepts(output_type) {
            return Err(WalletError::InvalidDestinationForType {
                output_type,
                reason: destination.kind().to_string(),
            });
        }
        Ok(Self {
            destination,
            amount,
            output_type,
        })
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }
}
