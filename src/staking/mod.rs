//! Proof-of-stake block production: kernel checks, coinstake signing and
//! the assembler loop.

pub mod assembler;
pub mod kernel;
pub mod signer;
pub mod window;
