//! Request signing. HMAC-SHA256 covers the centralized-exchange venues
//! (Binance/Bybit/MEXC) that authenticate with an API key + secret.
//!
//! EIP-712/wallet-keypair venues (Polymarket, Hyperliquid, the Solana DEXes)
//! need a real signing library this crate does not carry (on-chain
//! transaction construction is out of scope); those adapters accept any
//! `Signer` but only call it for operations that don't actually require a
//! signature over a real wallet key.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> String;
}

pub struct HmacSigner {
    secret: String,
}

impl HmacSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signature_is_deterministic() {
        let signer = HmacSigner::new("secret");
        let a = signer.sign(b"payload");
        let b = signer.sign(b"payload");
        assert_eq!(a, b);
        assert_ne!(a, signer.sign(b"different"));
    }
}
