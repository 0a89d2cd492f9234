use crate::crypto::stealth::StealthAddress;
use crate::crypto::PublicKey;
use crate::error::WalletError;
use crate::types::OutputType;
use crate::wallet::descriptor::Destination;

/// Human readable address encoding.
pub trait AddressMapper {
    fn map_destination(&self, destination: &Destination) -> String;

    fn map_address(&self, address: &str) -> Result<Destination, String>;

    /// Parses `address` as a destination for `output_type`; both malformed
    /// strings and type mismatches surface as `InvalidDestinationForType`.
    fn map_address_for(
        &self,
        address: &str,
        output_type: OutputType,
    ) -> Result<Destination, WalletError> {
        let destination = self.map_address(address).map_err(|reason| {
            WalletError::InvalidDestinationForType {
                output_type,
                reason,
            }
        })?;
        if !destination.accepts(output_type) {
            return Err(WalletError::InvalidDestinationForType {
                output_type,
                reason: destination.kind().to_string(),
            });
        }
        Ok(destination)
    }
}

/// `tp1<hex key>` for transparent keys, `sx1<hex scan><hex spend>` for
/// stealth addresses.
#[derive(Default)]
pub struct StringAddressMapper {}

impl StringAddressMapper {
    const TRANSPARENT_PREFIX: &'static str = "tp1";
    const STEALTH_PREFIX: &'static str = "sx1";

    fn parse_key(part: &str) -> Result<PublicKey, String> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(part, &mut bytes)
            .map_err(|err| format!("can't parse key {:?}: {}", part, err))?;
        let key = PublicKey(bytes);
        match key.point() {
            Some(_) => Ok(key),
            None => Err(format!("key {:?} is not a valid point", part)),
        }
    }
}

impl AddressMapper for StringAddressMapper {
    fn map_destination(&self, destination: &Destination) -> String {
        match destination {
            Destination::Transparent(key) => {
                format!("{}{}", Self::TRANSPARENT_PREFIX, hex::encode(key.0))
            }
            Destination::Stealth(address) => format!(
                "{}{}{}",
                Self::STEALTH_PREFIX,
                hex::encode(address.scan.0),
                hex::encode(address.spend.0)
            ),
        }
    }

    fn map_address(&self, address: &str) -> Result<Destination, String> {
        if let Some(rest) = address.strip_prefix(Self::TRANSPARENT_PREFIX) {
            if rest.len() != 64 {
                return Err(format!("can't parse address: {:?}", address));
            }
            return Ok(Destination::Transparent(Self::parse_key(rest)?));
        }
        if let Some(rest) = address.strip_prefix(Self::STEALTH_PREFIX) {
            if rest.len() != 128 || !rest.is_char_boundary(64) {
                return Err(format!("can't parse address: {:?}", address));
            }
            let (scan, spend) = rest.split_at(64);
            return Ok(Destination::Stealth(StealthAddress {
                scan: Self::parse_key(scan)?,
                spend: Self::parse_key(spend)?,
            }));
        }
        Err(format!("unknown address prefix: {:?}", address))
    }
}
