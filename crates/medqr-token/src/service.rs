//! Token issuance and resolution service.

use crate::error::{TokenError, TokenResult};
use crate::signer::Signer;
use crate::store::{TokenRecord, TokenStore};
use medqr_core::{EntityType, now_utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Lifetimes for the two token classes.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Validity window of ephemeral (one-time / live hand-off) tokens.
    pub ephemeral_ttl: Duration,
    /// Retention of permanent tokens; effectively indefinite.
    pub permanent_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ephemeral_ttl: Duration::from_secs(60),
            permanent_ttl: Duration::from_secs(86_400 * 365),
        }
    }
}

/// Successful resolution of a scanned token.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub token_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub ephemeral: bool,
    pub metadata: Map<String, Value>,
}

/// Issues and resolves signed tokens against a [`TokenStore`].
#[derive(Clone)]
pub struct TokenService {
    signer: Signer,
    store: Arc<dyn TokenStore>,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(signer: Signer, store: Arc<dyn TokenStore>) -> Self {
        Self::with_config(signer, store, TokenConfig::default())
    }

    pub fn with_config(signer: Signer, store: Arc<dyn TokenStore>, config: TokenConfig) -> Self {
        Self {
            signer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a fresh token for an entity.
    ///
    /// The token text carries only a random UUID, never the entity id, so a
    /// leaked token reveals no identifiers. Re-issuing for the same entity
    /// invalidates nothing; earlier tokens stay valid until their own TTL.
    /// Callers wanting single-token-per-entity semantics must [`revoke`]
    /// explicitly.
    ///
    /// [`revoke`]: TokenService::revoke
    pub async fn issue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        ephemeral: bool,
        metadata: Option<Map<String, Value>>,
    ) -> TokenResult<String> {
        let token_id = Uuid::new_v4();

        let mut payload = format!("{entity_type}:{token_id}");
        if ephemeral {
            payload.push_str("|eph=1");
        }
        let signature = self.signer.sign(&payload);
        let token = format!("{payload}|sig={signature}");

        let record = TokenRecord {
            entity_type,
            entity_id: entity_id.to_string(),
            ephemeral,
            created_at: now_utc(),
            metadata: metadata.unwrap_or_default(),
        };
        let ttl = if ephemeral {
            self.config.ephemeral_ttl
        } else {
            self.config.permanent_ttl
        };
        self.store.put(token_id, record, ttl).await?;

        tracing::debug!(%token_id, %entity_type, ephemeral, "token issued");
        Ok(token)
    }

    /// Resolve a scanned token back to the entity it denotes.
    ///
    /// Verification order: signature first, then payload structure, then the
    /// store lookup. Ephemeral entries are additionally checked against
    /// wall-clock elapsed time even when the store has not evicted them yet
    /// (store TTL granularity and clock skew), and are evicted on detection.
    pub async fn resolve(&self, token: &str) -> TokenResult<Resolution> {
        let (payload, signature) = token
            .rsplit_once("|sig=")
            .ok_or(TokenError::MissingSignature)?;

        if !self.signer.verify(payload, signature) {
            return Err(TokenError::InvalidSignature);
        }

        let mut segments = payload.split('|');
        let head = segments.next().unwrap_or_default();
        let marked_ephemeral = segments.any(|s| s == "eph=1");

        let (type_name, uuid_text) = head
            .split_once(':')
            .ok_or_else(|| TokenError::malformed("missing ':' separator"))?;
        type_name
            .parse::<EntityType>()
            .map_err(|e| TokenError::malformed(e.to_string()))?;
        let token_id = Uuid::parse_str(uuid_text)
            .map_err(|_| TokenError::malformed("token id is not a UUID"))?;

        let record = self
            .store
            .get(token_id)
            .await?
            .ok_or(TokenError::NotFound)?;

        if record.ephemeral || marked_ephemeral {
            let deadline = medqr_core::expires_at(record.created_at, self.config.ephemeral_ttl);
            if now_utc() > deadline {
                self.store.delete(token_id).await?;
                tracing::debug!(%token_id, "ephemeral token expired at resolve");
                return Err(TokenError::Expired);
            }
        }

        Ok(Resolution {
            token_id,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            ephemeral: record.ephemeral,
            metadata: record.metadata,
        })
    }

    /// Administrative clear of a stored token record (regenerate / revoke).
    pub async fn revoke(&self, token_id: Uuid) -> TokenResult<bool> {
        let removed = self.store.delete(token_id).await?;
        if removed {
            tracing::info!(%token_id, "token revoked");
        }
        Ok(removed)
    }
}

/// Wrap a token as a query parameter on the fixed scan path of `base`.
pub fn scan_url(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    url.set_path("/scan");
    url.query_pairs_mut().clear().append_pair("code", token);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTokenStore;

    fn service() -> TokenService {
        TokenService::new(
            Signer::new("test-secret"),
            Arc::new(InMemoryTokenStore::new()),
        )
    }

    fn service_with_ephemeral_ttl(ttl: Duration) -> TokenService {
        TokenService::with_config(
            Signer::new("test-secret"),
            Arc::new(InMemoryTokenStore::new()),
            TokenConfig {
                ephemeral_ttl: ttl,
                ..TokenConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_issue_resolve_roundtrip_permanent() {
        let svc = service();
        let token = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();

        let res = svc.resolve(&token).await.unwrap();
        assert_eq!(res.entity_type, EntityType::Device);
        assert_eq!(res.entity_id, "42");
        assert!(!res.ephemeral);
    }

    #[tokio::test]
    async fn test_issue_resolve_roundtrip_ephemeral() {
        let svc = service();
        let token = svc
            .issue(EntityType::Patient, "p-9", true, None)
            .await
            .unwrap();
        assert!(token.contains("|eph=1|sig="));

        let res = svc.resolve(&token).await.unwrap();
        assert_eq!(res.entity_type, EntityType::Patient);
        assert_eq!(res.entity_id, "p-9");
        assert!(res.ephemeral);
    }

    #[tokio::test]
    async fn test_token_format() {
        let svc = service();
        let token = svc
            .issue(EntityType::Bed, "b-3", false, None)
            .await
            .unwrap();

        let (payload, sig) = token.rsplit_once("|sig=").unwrap();
        assert_eq!(sig.len(), crate::SIGNATURE_LEN);
        let (type_name, uuid_text) = payload.split_once(':').unwrap();
        assert_eq!(type_name, "bed");
        // The text carries an opaque UUID, never the entity id
        Uuid::parse_str(uuid_text).unwrap();
        assert!(!token.contains("b-3"));
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let svc = service();
        let mut meta = Map::new();
        meta.insert("ward".to_string(), serde_json::json!("icu"));
        let token = svc
            .issue(EntityType::Device, "7", false, Some(meta))
            .await
            .unwrap();

        let res = svc.resolve(&token).await.unwrap();
        assert_eq!(res.metadata.get("ward"), Some(&serde_json::json!("icu")));
    }

    #[tokio::test]
    async fn test_missing_signature() {
        let err = service().resolve("device:whatever").await.unwrap_err();
        assert!(matches!(err, TokenError::MissingSignature));
    }

    #[tokio::test]
    async fn test_mutated_signature_rejected() {
        let svc = service();
        let token = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();

        let (payload, sig) = token.rsplit_once("|sig=").unwrap();
        let flipped: String = sig
            .chars()
            .enumerate()
            .map(|(i, c)| if i == 0 { if c == '0' { '1' } else { '0' } } else { c })
            .collect();
        let mutated = format!("{payload}|sig={flipped}");

        let err = svc.resolve(&mutated).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let svc = service();
        let token = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();

        // Swap the entity type while keeping the original signature
        let tampered = token.replacen("device:", "patient:", 1);
        let err = svc.resolve(&tampered).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_well_signed_but_never_issued() {
        let svc = service();
        let payload = format!("device:{}", Uuid::new_v4());
        let sig = Signer::new("test-secret").sign(&payload);
        let forged = format!("{payload}|sig={sig}");

        let err = svc.resolve(&forged).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let svc = service();
        // Signed garbage: signature valid, structure not
        let payload = "no-separator-here";
        let sig = Signer::new("test-secret").sign(payload);
        let err = svc.resolve(&format!("{payload}|sig={sig}")).await.unwrap_err();
        assert!(matches!(err, TokenError::MalformedPayload(_)));

        let payload = "gadget:not-a-uuid";
        let sig = Signer::new("test-secret").sign(payload);
        let err = svc.resolve(&format!("{payload}|sig={sig}")).await.unwrap_err();
        assert!(matches!(err, TokenError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_ephemeral_expires() {
        let svc = service_with_ephemeral_ttl(Duration::from_millis(40));
        let token = svc
            .issue(EntityType::User, "u-1", true, None)
            .await
            .unwrap();

        // Inside the window
        svc.resolve(&token).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let err = svc.resolve(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired | TokenError::NotFound));

        // Proactively evicted: the second attempt is a plain NotFound
        let err = svc.resolve(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[tokio::test]
    async fn test_reissue_keeps_old_token_valid() {
        let svc = service();
        let first = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();
        let second = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();
        assert_ne!(first, second);

        assert_eq!(svc.resolve(&first).await.unwrap().entity_id, "42");
        assert_eq!(svc.resolve(&second).await.unwrap().entity_id, "42");
    }

    #[tokio::test]
    async fn test_revoke() {
        let svc = service();
        let token = svc
            .issue(EntityType::Device, "42", false, None)
            .await
            .unwrap();
        let token_id = svc.resolve(&token).await.unwrap().token_id;

        assert!(svc.revoke(token_id).await.unwrap());
        let err = svc.resolve(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[test]
    fn test_scan_url() {
        let base = Url::parse("https://hospital.example").unwrap();
        let token = "device:abc|sig=0011223344556677";
        let url = scan_url(&base, token);
        assert_eq!(url.path(), "/scan");
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(code, token);
    }
}
