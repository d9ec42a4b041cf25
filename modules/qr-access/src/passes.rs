//! Entry-pass issuance and validation.
//!
//! A pass is a short-lived, signed claim that a visitor may cross one access
//! point of one organization. Signatures are SHA-256 over the claim fields
//! and a per-boot secret, so passes do not survive a restart and cannot be
//! forged or replayed with edited fields.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A signed entry pass, rendered client-side as a QR code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryPass {
    pub id: String,
    pub organization_id: String,
    pub access_point: String,
    /// RFC 3339 expiry instant.
    pub expires_at: String,
    pub signature: String,
}

/// Validation verdict for a presented pass.
#[derive(Clone, Debug, Serialize)]
pub struct PassVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl PassVerdict {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn invalid(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Issues and validates passes against a per-boot secret.
pub struct PassService {
    secret: [u8; 32],
    ttl_secs: AtomicU64,
    issued: AtomicU64,
}

impl PassService {
    #[must_use]
    pub fn new(secret: [u8; 32], ttl_secs: u64) -> Self {
        Self {
            secret,
            ttl_secs: AtomicU64::new(ttl_secs),
            issued: AtomicU64::new(0),
        }
    }

    pub fn set_ttl_secs(&self, ttl_secs: u64) {
        self.ttl_secs.store(ttl_secs, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn issue(&self, organization_id: &str, access_point: &str) -> EntryPass {
        let id = uuid::Uuid::new_v4().to_string();
        let ttl = self.ttl_secs.load(Ordering::Relaxed);
        let expires_at =
            (Utc::now() + chrono::Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX)))
                .to_rfc3339();
        let signature = self.sign(&id, organization_id, access_point, &expires_at);
        self.issued.fetch_add(1, Ordering::Relaxed);
        EntryPass {
            id,
            organization_id: organization_id.to_owned(),
            access_point: access_point.to_owned(),
            expires_at,
            signature,
        }
    }

    #[must_use]
    pub fn validate(&self, pass: &EntryPass) -> PassVerdict {
        let expected = self.sign(
            &pass.id,
            &pass.organization_id,
            &pass.access_point,
            &pass.expires_at,
        );
        if expected != pass.signature {
            return PassVerdict::invalid("bad_signature");
        }
        let Ok(expires_at) = DateTime::parse_from_rfc3339(&pass.expires_at) else {
            return PassVerdict::invalid("bad_expiry");
        };
        if expires_at < Utc::now() {
            return PassVerdict::invalid("expired");
        }
        PassVerdict::valid()
    }

    fn sign(&self, id: &str, organization_id: &str, access_point: &str, expires_at: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        // Length-prefix each field so concatenation is unambiguous.
        for field in [id, organization_id, access_point, expires_at] {
            hasher.update(u64::try_from(field.len()).unwrap_or(u64::MAX).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PassService {
        PassService::new([7u8; 32], 120)
    }

    #[test]
    fn issued_pass_validates() {
        let svc = service();
        let pass = svc.issue("org-1", "front-gate");
        assert!(svc.validate(&pass).valid);
        assert_eq!(svc.issued_count(), 1);
    }

    #[test]
    fn tampered_fields_are_rejected() {
        let svc = service();
        let mut pass = svc.issue("org-1", "front-gate");
        pass.organization_id = "org-2".to_owned();
        let verdict = svc.validate(&pass);
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, Some("bad_signature"));
    }

    #[test]
    fn expired_pass_is_rejected() {
        let svc = service();
        svc.set_ttl_secs(0);
        let pass = svc.issue("org-1", "front-gate");
        // ttl 0 expires immediately relative to the validation instant.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let verdict = svc.validate(&pass);
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, Some("expired"));
    }

    #[test]
    fn passes_do_not_cross_service_secrets() {
        let a = PassService::new([1u8; 32], 120);
        let b = PassService::new([2u8; 32], 120);
        let pass = a.issue("org-1", "front-gate");
        assert!(!b.validate(&pass).valid);
    }
}
