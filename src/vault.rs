//! Per-user, per-venue encrypted credential storage, grounded in the
//! teacher's `vault::vault_db` + PBKDF2/AES-GCM encryption scheme.
//!
//! The decryption key is derived once from `Config::vault_passphrase` and
//! held only in this process's memory; it is never written to Store.

use crate::error::{AppError, AppResult};
use crate::models::{CredentialMode, TradingCredential, Venue};
use crate::store::Store;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::warn;

const PBKDF2_ROUNDS: u32 = 100_000;
const NONCE_LEN: usize = 12;

/// Decrypted credential material handed to a venue adapter for one call.
#[derive(Debug, Clone)]
pub struct DecryptedCredential {
    pub api_key: String,
    pub api_secret: String,
    pub wallet_secret: Option<String>,
}

pub struct CredentialVault {
    store: Store,
    cipher: Aes256Gcm,
    failure_threshold: u32,
    backoff_base: ChronoDuration,
}

impl CredentialVault {
    pub fn new(store: Store, passphrase: &str, failure_threshold: u32, backoff_base_ms: i64) -> Self {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), b"venue-core-vault", PBKDF2_ROUNDS, &mut key);
        let cipher = Aes256Gcm::new_from_slice(&key).expect("32-byte key");
        Self {
            store,
            cipher,
            failure_threshold,
            backoff_base: ChronoDuration::milliseconds(backoff_base_ms),
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("encryption under a fixed 32-byte key never fails");
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        out
    }

    fn decrypt(&self, blob: &[u8]) -> AppResult<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(AppError::ValidationError("credential blob truncated".into()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::ValidationError("credential decryption failed".into()))
    }

    /// Encrypts and stores `(api_key, api_secret, wallet_secret)` for
    /// `(user_id, venue)`. Resets failure/cooldown state.
    pub async fn store_credential(
        &self,
        user_id: &str,
        venue: Venue,
        mode: CredentialMode,
        plaintext: &DecryptedCredential,
    ) -> AppResult<()> {
        let json = serde_json::json!({
            "api_key": plaintext.api_key,
            "api_secret": plaintext.api_secret,
            "wallet_secret": plaintext.wallet_secret,
        })
        .to_string();
        let encrypted_blob = self.encrypt(json.as_bytes());
        let cred = TradingCredential {
            user_id: user_id.to_string(),
            venue,
            mode,
            encrypted_blob,
            enabled: true,
            last_used_at: None,
            failed_attempts: 0,
            cooldown_until: None,
        };
        self.store.upsert_credential(&cred).await
    }

    /// Decrypts and returns the credential, refusing while in cooldown.
    pub async fn get(&self, user_id: &str, venue: Venue) -> AppResult<DecryptedCredential> {
        let cred = self
            .store
            .get_credential(user_id, venue)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("no credential for {user_id}/{}", venue.as_str())))?;

        if !cred.enabled {
            return Err(AppError::ValidationError("credential disabled".into()));
        }
        if let Some(until) = cred.cooldown_until {
            if until > Utc::now() {
                return Err(AppError::CooldownError(until));
            }
        }

        let plaintext = self.decrypt(&cred.encrypted_blob)?;
        let parsed: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::ValidationError(format!("corrupt credential payload: {e}")))?;
        Ok(DecryptedCredential {
            api_key: parsed["api_key"].as_str().unwrap_or_default().to_string(),
            api_secret: parsed["api_secret"].as_str().unwrap_or_default().to_string(),
            wallet_secret: parsed["wallet_secret"].as_str().map(str::to_string),
        })
    }

    /// Increments the failure counter; on crossing `failure_threshold`,
    /// sets `cooldown_until = now + backoff_base * 2^(failures-threshold)`.
    pub async fn record_failure(&self, user_id: &str, venue: Venue) -> AppResult<()> {
        let mut cred = self
            .store
            .get_credential(user_id, venue)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("no credential for {user_id}/{}", venue.as_str())))?;

        cred.failed_attempts += 1;
        if cred.failed_attempts >= self.failure_threshold {
            let overage = cred.failed_attempts - self.failure_threshold;
            let backoff = self.backoff_base * 2i32.saturating_pow(overage);
            cred.cooldown_until = Some(Utc::now() + backoff);
            warn!(
                user_id,
                venue = venue.as_str(),
                failures = cred.failed_attempts,
                "credential entering cooldown"
            );
        }
        self.store.upsert_credential(&cred).await
    }

    /// Clears failure/cooldown state and stamps `last_used_at`.
    pub async fn record_success(&self, user_id: &str, venue: Venue) -> AppResult<()> {
        let mut cred = self
            .store
            .get_credential(user_id, venue)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("no credential for {user_id}/{}", venue.as_str())))?;
        cred.failed_attempts = 0;
        cred.cooldown_until = None;
        cred.last_used_at = Some(Utc::now());
        self.store.upsert_credential(&cred).await
    }

    pub async fn enabled_venues(&self, user_id: &str) -> AppResult<Vec<Venue>> {
        let creds = self.store.list_enabled_credentials(user_id).await?;
        Ok(creds.into_iter().map(|c| c.venue).collect())
    }

    pub fn cooldown_remaining(cooldown_until: Option<DateTime<Utc>>) -> Option<ChronoDuration> {
        cooldown_until.and_then(|until| {
            let remaining = until - Utc::now();
            (remaining > ChronoDuration::zero()).then_some(remaining)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_vault() -> (CredentialVault, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("vault.db")).unwrap();
        let vault = CredentialVault::new(store, "test-passphrase", 3, 60_000);
        (vault, dir)
    }

    #[tokio::test]
    async fn store_then_get_roundtrips_plaintext() {
        let (vault, _dir) = temp_vault().await;
        let plain = DecryptedCredential {
            api_key: "key123".into(),
            api_secret: "secret456".into(),
            wallet_secret: None,
        };
        vault
            .store_credential("u1", Venue::BinanceFutures, CredentialMode::Live, &plain)
            .await
            .unwrap();
        let got = vault.get("u1", Venue::BinanceFutures).await.unwrap();
        assert_eq!(got.api_key, "key123");
        assert_eq!(got.api_secret, "secret456");
    }

    #[tokio::test]
    async fn three_failures_at_threshold_trigger_cooldown() {
        let (vault, _dir) = temp_vault().await;
        let plain = DecryptedCredential {
            api_key: "k".into(),
            api_secret: "s".into(),
            wallet_secret: None,
        };
        vault
            .store_credential("u1", Venue::Kalshi, CredentialMode::Demo, &plain)
            .await
            .unwrap();
        for _ in 0..3 {
            vault.record_failure("u1", Venue::Kalshi).await.unwrap();
        }
        let err = vault.get("u1", Venue::Kalshi).await.unwrap_err();
        assert!(matches!(err, AppError::CooldownError(_)));
    }

    #[tokio::test]
    async fn record_success_clears_failure_state() {
        let (vault, _dir) = temp_vault().await;
        let plain = DecryptedCredential {
            api_key: "k".into(),
            api_secret: "s".into(),
            wallet_secret: None,
        };
        vault
            .store_credential("u1", Venue::Mexc, CredentialMode::Demo, &plain)
            .await
            .unwrap();
        vault.record_failure("u1", Venue::Mexc).await.unwrap();
        vault.record_failure("u1", Venue::Mexc).await.unwrap();
        vault.record_success("u1", Venue::Mexc).await.unwrap();
        let got = vault.get("u1", Venue::Mexc).await;
        assert!(got.is_ok());
    }
}
