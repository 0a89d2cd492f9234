//! Transaction construction. One variant per source privacy type decides
//! which coins fund the payment and where change goes; selection, output
//! preparation and signing are shared.

use std::cmp::Reverse;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use itertools::Itertools;
use rand::Rng;
use tracing::{debug, info};

use crate::chain::Chain;
use crate::config::EngineConfig;
use crate::crypto::commitment::BlindingFactor;
use crate::crypto::keys::KeyStore;
use crate::crypto::range_proof::RangeProver;
use crate::crypto::signature::{sign, sign_ring, KeyImage, RingMember};
use crate::crypto::{PublicKey, SecretKey};
use crate::error::WalletError;
use crate::tx::{
    BalanceKernel, InputRecord, InputWitness, OutputRecord, Transaction, TransactionRecord,
    TxInput, TxKind,
};
use crate::types::{Amount, OutPoint, OutputType, TxId};
use crate::wallet::coin_set::OwnedCoin;
use crate::wallet::conversion::{kernel_excess, PreparedOutput, PrivacyConverter};
use crate::wallet::descriptor::{Destination, OutputDescriptor};
use crate::wallet::selection::{select_coins, SelectionRequest, SizeFeeEstimator};
use crate::wallet::WalletState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FundingStrategy {
    /// coin control picks from every spendable coin
    Automatic,
    /// selection is restricted to these coins
    Manual(Vec<OutPoint>),
}

#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub source: OutputType,
    pub descriptors: Vec<OutputDescriptor>,
    pub funding: FundingStrategy,
    pub subtract_fee_from_recipient: bool,
    /// ring members per anonymous input; the configured default when unset
    pub ring_size: Option<usize>,
    /// let coins of other privacy types follow the source type's coins
    pub allow_conversion: bool,
}

impl BuildRequest {
    pub fn new(source: OutputType, descriptors: Vec<OutputDescriptor>) -> Self {
        Self {
            source,
            descriptors,
            funding: FundingStrategy::Automatic,
            subtract_fee_from_recipient: false,
            ring_size: None,
            allow_conversion: false,
        }
    }

    pub fn with_funding(mut self, funding: FundingStrategy) -> Self {
        self.funding = funding;
        self
    }

    pub fn subtract_fee_from_recipient(mut self, subtract: bool) -> Self {
        self.subtract_fee_from_recipient = subtract;
        self
    }

    pub fn with_ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = Some(ring_size);
        self
    }

    pub fn allow_conversion(mut self, allow: bool) -> Self {
        self.allow_conversion = allow;
        self
    }
}

/// A signed transaction with the wallet-private record built next to it.
#[derive(Clone, Debug)]
pub struct BuildOutcome {
    pub transaction: Transaction,
    pub record: TransactionRecord,
    pub fee: Amount,
}

impl BuildOutcome {
    pub fn txid(&self) -> TxId {
        self.record.txid
    }
}

/// State changes a successful build applies to the wallet.
pub struct BuildEffects {
    pub spent: Vec<OutPoint>,
    /// transparent key index handed out for change
    pub change_key: Option<u32>,
}

/// Services a build reads from.
pub struct BuildEnv<'a> {
    pub keys: &'a dyn KeyStore,
    pub chain: &'a dyn Chain,
    pub prover: &'a dyn RangeProver,
    pub config: &'a EngineConfig,
}

pub trait BuildVariant: Sync {
    fn source(&self) -> OutputType;

    /// Change keeps the privacy level of the coins it comes from.
    fn change_type(&self) -> OutputType {
        self.source()
    }

    /// Destination for change, and the transparent key index it uses.
    fn change_destination(
        &self,
        state: &WalletState,
        keys: &dyn KeyStore,
    ) -> (Destination, Option<u32>);

    fn check_ring(&self, _env: &BuildEnv<'_>, _ring_size: usize) -> Result<(), WalletError> {
        Ok(())
    }

    /// Spendable coins in the order selection consumes them: coins of the
    /// source type first, larger values first.
    fn candidates(
        &self,
        state: &WalletState,
        env: &BuildEnv<'_>,
        allow_conversion: bool,
    ) -> Vec<OwnedCoin> {
        let source = self.source();
        let tip = env.chain.current_height();
        state
            .coins
            .unspent()
            .filter(|coin| coin.output_type == source || allow_conversion)
            .filter(|coin| state.eligibility.is_spendable(coin, tip))
            .filter(|coin| {
                coin.output_type != OutputType::Anonymous
                    || env.chain.anon_index_of(&coin.outpoint).is_some()
            })
            .sorted_by_key(|coin| (coin.output_type != source, Reverse(coin.value), coin.outpoint))
            .cloned()
            .collect()
    }
}

pub struct TransparentBuild;

impl BuildVariant for TransparentBuild {
    fn source(&self) -> OutputType {
        OutputType::Transparent
    }

    fn change_destination(
        &self,
        state: &WalletState,
        keys: &dyn KeyStore,
    ) -> (Destination, Option<u32>) {
        let index = state.addresses.next_index();
        (
            Destination::Transparent(keys.transparent_public_key(index)),
            Some(index),
        )
    }
}

pub struct HiddenBuild;

impl BuildVariant for HiddenBuild {
    fn source(&self) -> OutputType {
        OutputType::Hidden
    }

    fn change_destination(
        &self,
        _state: &WalletState,
        keys: &dyn KeyStore,
    ) -> (Destination, Option<u32>) {
        (Destination::Stealth(keys.stealth_address()), None)
    }
}

pub struct AnonymousBuild;

impl BuildVariant for AnonymousBuild {
    fn source(&self) -> OutputType {
        OutputType::Anonymous
    }

    fn change_destination(
        &self,
        _state: &WalletState,
        keys: &dyn KeyStore,
    ) -> (Destination, Option<u32>) {
        (Destination::Stealth(keys.stealth_address()), None)
    }

    /// Fails before selection when no ring of `ring_size` can be drawn.
    fn check_ring(&self, env: &BuildEnv<'_>, ring_size: usize) -> Result<(), WalletError> {
        let available = env.chain.anon_count();
        if available < ring_size as u64 {
            return Err(WalletError::DecoySetExhausted {
                needed: ring_size,
                decoys: ring_size - 1,
                available,
            });
        }
        Ok(())
    }
}

pub fn variant_for(source: OutputType) -> &'static dyn BuildVariant {
    match source {
        OutputType::Transparent => &TransparentBuild,
        OutputType::Hidden => &HiddenBuild,
        OutputType::Anonymous => &AnonymousBuild,
    }
}

enum InputSigner {
    Key(SecretKey),
    Ring {
        members: Vec<RingMember>,
        real: usize,
        secret: SecretKey,
        delta: Scalar,
    },
}

struct BuiltOutput {
    prepared: PreparedOutput,
    owned: bool,
    change: bool,
}

fn is_own_destination(
    state: &WalletState,
    keys: &dyn KeyStore,
    destination: &Destination,
) -> bool {
    match destination {
        Destination::Transparent(key) => state.addresses.index_of(key).is_some(),
        Destination::Stealth(address) => *address == keys.stealth_address(),
    }
}

fn manual_candidates(
    state: &WalletState,
    outpoints: &[OutPoint],
    source: OutputType,
    allow_conversion: bool,
) -> Result<Vec<OwnedCoin>, WalletError> {
    if !outpoints.iter().all_unique() {
        return Err(WalletError::InvalidRequest(
            "the same coin is listed twice".to_string(),
        ));
    }
    outpoints
        .iter()
        .map(|outpoint| {
            let coin = state
                .coins
                .get(outpoint)
                .filter(|coin| coin.is_unspent())
                .ok_or_else(|| {
                    WalletError::InvalidRequest(format!("{} is not an unspent wallet coin", outpoint))
                })?;
            if coin.output_type != source && !allow_conversion {
                return Err(WalletError::InvalidRequest(format!(
                    "{} is a {} coin, not {}",
                    outpoint, coin.output_type, source
                )));
            }
            Ok(coin.clone())
        })
        .collect()
}

/// Builds and signs a transaction against `state` without changing it.
/// The caller holds the wallet lock and applies the returned effects.
pub fn build_transaction(
    env: &BuildEnv<'_>,
    state: &WalletState,
    request: &BuildRequest,
) -> Result<(BuildOutcome, BuildEffects), WalletError> {
    if request.descriptors.is_empty() {
        return Err(WalletError::InvalidRequest("no outputs requested".to_string()));
    }
    if request.descriptors.iter().any(|d| d.amount() == 0) {
        return Err(WalletError::InvalidRequest("output amount is zero".to_string()));
    }

    let variant = variant_for(request.source);
    let ring_size = request
        .ring_size
        .unwrap_or(env.config.default_ring_size)
        .max(1);
    variant.check_ring(env, ring_size)?;

    let candidates = match &request.funding {
        FundingStrategy::Automatic => variant.candidates(state, env, request.allow_conversion),
        FundingStrategy::Manual(outpoints) => {
            manual_candidates(state, outpoints, request.source, request.allow_conversion)?
        }
    };
    let recipients: Vec<(OutputType, Amount)> = request
        .descriptors
        .iter()
        .map(|d| (d.output_type(), d.amount()))
        .collect();
    let estimator = SizeFeeEstimator::new(env.config.fee.clone());
    let selection = select_coins(
        &candidates,
        &SelectionRequest {
            recipients: &recipients,
            change_type: variant.change_type(),
            subtract_fee_from_recipient: request.subtract_fee_from_recipient,
            ring_size,
        },
        &estimator,
        &env.config.fee,
    )?;

    let mut rng = rand::thread_rng();
    let converter = PrivacyConverter::new(env.chain, env.prover);

    let mut outputs = Vec::with_capacity(request.descriptors.len() + 1);
    for (descriptor, amount) in request
        .descriptors
        .iter()
        .zip(selection.recipient_amounts.iter())
    {
        outputs.push(BuiltOutput {
            prepared: converter.prepare_output(
                descriptor.destination(),
                descriptor.output_type(),
                *amount,
                &mut rng,
            )?,
            owned: is_own_destination(state, env.keys, descriptor.destination()),
            change: false,
        });
    }
    let mut change_key = None;
    if let Some(change) = selection.change {
        let (destination, key_index) = variant.change_destination(state, env.keys);
        change_key = key_index;
        let prepared =
            converter.prepare_output(&destination, variant.change_type(), change, &mut rng)?;
        let position = rng.gen_range(0..=outputs.len());
        outputs.insert(
            position,
            BuiltOutput {
                prepared,
                owned: true,
                change: true,
            },
        );
    }

    let mut inputs = Vec::with_capacity(selection.inputs.len());
    let mut input_records = Vec::with_capacity(selection.inputs.len());
    let mut input_blindings = Vec::with_capacity(selection.inputs.len());
    let mut signers = Vec::with_capacity(selection.inputs.len());
    for coin in selection.inputs.iter() {
        let secret = env.keys.derive_spend_key(&coin.origin).ok_or_else(|| {
            WalletError::SigningFailed(format!("spend key for {} unavailable", coin.outpoint))
        })?;
        let mut record = InputRecord {
            output_type: coin.output_type,
            prevout: Some(coin.outpoint),
            value: coin.value,
            ring: vec![],
            real_index: None,
            blinding: Some(coin.blinding),
        };
        match coin.output_type {
            OutputType::Transparent | OutputType::Hidden => {
                let prevout = coin.outpoint;
                inputs.push(if coin.output_type == OutputType::Transparent {
                    TxInput::Transparent { prevout }
                } else {
                    TxInput::Hidden { prevout }
                });
                input_blindings.push(coin.blinding.scalar());
                signers.push(InputSigner::Key(secret));
            }
            OutputType::Anonymous => {
                let real_index = env.chain.anon_index_of(&coin.outpoint).ok_or_else(|| {
                    WalletError::SigningFailed(format!(
                        "{} is not in the anonymity set",
                        coin.outpoint
                    ))
                })?;
                let ring = converter.select_ring(real_index, ring_size, &mut rng)?;
                let (pseudo_commitment, pseudo_blinding) =
                    converter.pseudo_commitment(coin.value, &mut rng);
                let members = ring.signing_members(&pseudo_commitment)?;
                inputs.push(TxInput::Anonymous {
                    ring: ring.indices.clone(),
                    key_image: KeyImage::derive(&secret),
                    pseudo_commitment,
                });
                record.ring = ring.indices.clone();
                record.real_index = Some(ring.real_position);
                input_blindings.push(pseudo_blinding);
                signers.push(InputSigner::Ring {
                    members,
                    real: ring.real_position,
                    secret,
                    delta: coin.blinding.scalar() - pseudo_blinding,
                });
            }
        }
        input_records.push(record);
    }

    let mut tx = Transaction {
        version: Transaction::VERSION,
        kind: TxKind::Standard,
        inputs,
        outputs: outputs.iter().map(|o| o.prepared.output.clone()).collect(),
        fee: selection.fee,
        kernel: None,
        witness: Vec::with_capacity(signers.len()),
    };
    let excess = tx.has_committed_parts().then(|| {
        let output_blindings: Vec<Scalar> = outputs.iter().map(|o| o.prepared.blinding).collect();
        kernel_excess(&input_blindings, &output_blindings)
    });
    let excess_key = excess
        .as_ref()
        .map(|excess| PublicKey::from_point(&RistrettoPoint::mul_base(excess)));
    let message = tx.txid_with_excess(excess_key.as_ref());

    for signer in signers.iter() {
        let witness = match signer {
            InputSigner::Key(secret) => {
                InputWitness::Key(sign(secret, message.as_bytes(), &mut rng))
            }
            InputSigner::Ring {
                members,
                real,
                secret,
                delta,
            } => {
                let (signature, _) =
                    sign_ring(message.as_bytes(), members, *real, secret, delta, &mut rng)
                        .ok_or_else(|| {
                            WalletError::SigningFailed(
                                "ring member does not match the spent coin".to_string(),
                            )
                        })?;
                InputWitness::Ring(signature)
            }
        };
        tx.witness.push(witness);
    }
    if let (Some(excess), Some(excess_key)) = (excess, excess_key) {
        tx.kernel = Some(BalanceKernel {
            excess: excess_key,
            signature: sign(&SecretKey::from_scalar(excess), message.as_bytes(), &mut rng),
        });
    }

    let txid = tx.txid();
    let record = TransactionRecord {
        txid,
        inputs: input_records,
        outputs: outputs
            .iter()
            .enumerate()
            .map(|(index, o)| OutputRecord {
                index: index as u32,
                output_type: o.prepared.output.output_type(),
                value: o.prepared.value,
                blinding: o
                    .prepared
                    .output
                    .output_type()
                    .is_committed()
                    .then(|| BlindingFactor::from_scalar(&o.prepared.blinding)),
                owned: o.owned,
                change: o.change,
            })
            .collect(),
        fee: selection.fee,
        from_me: true,
        confirmation: None,
    };
    debug!(
        "selection settled after {} rounds with {} inputs",
        selection.iterations,
        selection.inputs.len()
    );
    info!(
        "built {} spending {} coins: {} inputs, {} outputs, fee {}",
        txid,
        request.source,
        tx.inputs.len(),
        tx.outputs.len(),
        selection.fee
    );

    Ok((
        BuildOutcome {
            transaction: tx,
            record,
            fee: selection.fee,
        },
        BuildEffects {
            spent: selection.inputs.iter().map(|c| c.outpoint).collect(),
            change_key,
        },
    ))
}
