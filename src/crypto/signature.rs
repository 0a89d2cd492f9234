//! Schnorr signatures for key-owned inputs and two-row linkable ring
//! signatures for anonymous inputs.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::crypto::{hash_to_point, hash_to_scalar, scalar_from_bytes, PublicKey, SecretKey};
use crate::types::hex32;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "hex32")]
    challenge: [u8; 32],
    #[serde(with = "hex32")]
    response: [u8; 32],
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &hex::encode(self.challenge)[..16])
    }
}

fn schnorr_challenge(public: &RistrettoPoint, nonce: &RistrettoPoint, message: &[u8; 32]) -> Scalar {
    hash_to_scalar(
        b"ringstake/schnorr",
        &[
            public.compress().as_bytes(),
            nonce.compress().as_bytes(),
            message,
        ],
    )
}

pub fn sign<R: RngCore + CryptoRng>(secret: &SecretKey, message: &[u8; 32], rng: &mut R) -> Signature {
    let public = RistrettoPoint::mul_base(secret.scalar());
    let k = Scalar::random(rng);
    let nonce = RistrettoPoint::mul_base(&k);
    let e = schnorr_challenge(&public, &nonce, message);
    let s = k + e * secret.scalar();
    Signature {
        challenge: e.to_bytes(),
        response: s.to_bytes(),
    }
}

pub fn verify(public: &PublicKey, message: &[u8; 32], signature: &Signature) -> bool {
    let (public, e, s) = match (
        public.point(),
        scalar_from_bytes(&signature.challenge),
        scalar_from_bytes(&signature.response),
    ) {
        (Some(p), Some(e), Some(s)) => (p, e, s),
        _ => return false,
    };
    let nonce = RistrettoPoint::mul_base(&s) - e * public;
    schnorr_challenge(&public, &nonce, message) == e
}

/// `x·Hp(P)`: the same for every spend of one output, unlinkable to `P`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyImage(#[serde(with = "hex32")] pub [u8; 32]);

impl KeyImage {
    pub fn derive(secret: &SecretKey) -> Self {
        let public = RistrettoPoint::mul_base(secret.scalar());
        Self((secret.scalar() * key_image_base(&public)).compress().to_bytes())
    }

    fn point(&self) -> Option<RistrettoPoint> {
        CompressedRistretto(self.0)
            .decompress()
            .filter(|point| *point != RistrettoPoint::identity())
    }
}

impl fmt::Display for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({})", &hex::encode(self.0)[..16])
    }
}

fn key_image_base(public: &RistrettoPoint) -> RistrettoPoint {
    hash_to_point(b"ringstake/key-image", public.compress().as_bytes())
}

/// One ring position: the member's one-time key and the difference between
/// its commitment and the spender's pseudo commitment.
#[derive(Clone, Copy, Debug)]
pub struct RingMember {
    pub key: RistrettoPoint,
    pub commitment_delta: RistrettoPoint,
}

/// Two-row linkable ring signature. Row one proves knowledge of a one-time
/// secret and carries its key image; row two proves that the same member's
/// commitment minus the pseudo commitment opens to zero value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSignature {
    #[serde(with = "hex32")]
    c0: [u8; 32],
    responses: Vec<[u8; 32]>,
    commitment_responses: Vec<[u8; 32]>,
}

impl RingSignature {
    pub fn ring_size(&self) -> usize {
        self.responses.len()
    }
}

impl fmt::Debug for RingSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RingSignature(ring={})", self.responses.len())
    }
}

fn ring_challenge(
    message: &[u8; 32],
    left: &RistrettoPoint,
    right: &RistrettoPoint,
    commitment_left: &RistrettoPoint,
) -> Scalar {
    hash_to_scalar(
        b"ringstake/mlsag",
        &[
            message,
            left.compress().as_bytes(),
            right.compress().as_bytes(),
            commitment_left.compress().as_bytes(),
        ],
    )
}

/// Signs `message` as one anonymous member of `ring`. `real` is the position
/// whose key belongs to `secret` and whose commitment delta is
/// `delta_blinding·G`. Returns `None` when either does not hold.
pub fn sign_ring<R: RngCore + CryptoRng>(
    message: &[u8; 32],
    ring: &[RingMember],
    real: usize,
    secret: &SecretKey,
    delta_blinding: &Scalar,
    rng: &mut R,
) -> Option<(RingSignature, KeyImage)> {
    let n = ring.len();
    if real >= n
        || ring[real].key != RistrettoPoint::mul_base(secret.scalar())
        || ring[real].commitment_delta != RistrettoPoint::mul_base(delta_blinding)
    {
        return None;
    }
    let x = secret.scalar();
    let bases: Vec<RistrettoPoint> = ring.iter().map(|m| key_image_base(&m.key)).collect();
    let image = x * bases[real];

    let mut challenges = vec![Scalar::ZERO; n];
    let mut responses = vec![Scalar::ZERO; n];
    let mut commitment_responses = vec![Scalar::ZERO; n];

    let alpha = Scalar::random(rng);
    let beta = Scalar::random(rng);
    challenges[(real + 1) % n] = ring_challenge(
        message,
        &RistrettoPoint::mul_base(&alpha),
        &(alpha * bases[real]),
        &RistrettoPoint::mul_base(&beta),
    );

    let mut i = (real + 1) % n;
    while i != real {
        responses[i] = Scalar::random(rng);
        commitment_responses[i] = Scalar::random(rng);
        let left = RistrettoPoint::mul_base(&responses[i]) + challenges[i] * ring[i].key;
        let right = responses[i] * bases[i] + challenges[i] * image;
        let commitment_left = RistrettoPoint::mul_base(&commitment_responses[i])
            + challenges[i] * ring[i].commitment_delta;
        challenges[(i + 1) % n] = ring_challenge(message, &left, &right, &commitment_left);
        i = (i + 1) % n;
    }
    responses[real] = alpha - challenges[real] * x;
    commitment_responses[real] = beta - challenges[real] * delta_blinding;

    Some((
        RingSignature {
            c0: challenges[0].to_bytes(),
            responses: responses.iter().map(|r| r.to_bytes()).collect(),
            commitment_responses: commitment_responses.iter().map(|r| r.to_bytes()).collect(),
        },
        KeyImage(image.compress().to_bytes()),
    ))
}

pub fn verify_ring(
    message: &[u8; 32],
    ring: &[RingMember],
    image: &KeyImage,
    signature: &RingSignature,
) -> bool {
    if ring.is_empty()
        || ring.len() != signature.responses.len()
        || ring.len() != signature.commitment_responses.len()
    {
        return false;
    }
    let (image, c0) = match (image.point(), scalar_from_bytes(&signature.c0)) {
        (Some(image), Some(c0)) => (image, c0),
        _ => return false,
    };
    let mut c = c0;
    for ((member, response), commitment_response) in ring
        .iter()
        .zip(signature.responses.iter())
        .zip(signature.commitment_responses.iter())
    {
        let (r, rc) = match (
            scalar_from_bytes(response),
            scalar_from_bytes(commitment_response),
        ) {
            (Some(r), Some(rc)) => (r, rc),
            _ => return false,
        };
        let left = RistrettoPoint::mul_base(&r) + c * member.key;
        let right = r * key_image_base(&member.key) + c * image;
        let commitment_left = RistrettoPoint::mul_base(&rc) + c * member.commitment_delta;
        c = ring_challenge(message, &left, &right, &commitment_left);
    }
    c == c0
}
