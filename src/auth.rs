//! Signed, expiring bearer tokens for the two trust domains (users and fridges).
//!
//! Wire format: `base64url(claims json) "." base64url(mac)`, where the MAC is a
//! BLAKE3 keyed hash over the encoded claims. Each [`TokenKind`] gets its own key
//! derived from the shared secret, so a user token never verifies as a fridge
//! token and vice versa.
//!
//! Lifecycle relative to `exp`:
//! - more than `renew_before` left: [`Freshness::Fresh`]
//! - less than that left: [`Freshness::ExpiringSoon`]
//! - expired, but less than `grace` ago: [`Freshness::Grace`]
//! - anything older is rejected with `Unauthorized`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FridgeError, FridgeResult};

const USER_TOKEN_CONTEXT: &str = "smart-fridge 2026-01-10 user bearer token v1";
const FRIDGE_TOKEN_CONTEXT: &str = "smart-fridge 2026-01-10 fridge bearer token v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    User,
    Fridge,
}

impl TokenKind {
    fn context(self) -> &'static str {
        match self {
            TokenKind::User => USER_TOKEN_CONTEXT,
            TokenKind::Fridge => FRIDGE_TOKEN_CONTEXT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    ExpiringSoon,
    Grace,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated {
    pub subject_id: i64,
    pub expires_at: DateTime<Utc>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime {
    pub ttl: Duration,
    /// Tokens closer than this to expiry get refreshed by `is_authorized`.
    pub renew_before: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub user: TokenLifetime,
    pub fridge: TokenLifetime,
    /// How long after expiry a token may still be renewed.
    pub grace: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        TokenPolicy {
            user: TokenLifetime {
                ttl: Duration::days(14),
                renew_before: Duration::days(2),
            },
            fridge: TokenLifetime {
                ttl: Duration::days(30),
                renew_before: Duration::days(7),
            },
            grace: Duration::days(7),
        }
    }
}

impl TokenPolicy {
    fn lifetime(&self, kind: TokenKind) -> TokenLifetime {
        match kind {
            TokenKind::User => self.user,
            TokenKind::Fridge => self.fridge,
        }
    }
}

pub struct TokenAuthority {
    user_key: [u8; 32],
    fridge_key: [u8; 32],
    policy: TokenPolicy,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], policy: TokenPolicy) -> Self {
        TokenAuthority {
            user_key: blake3::derive_key(TokenKind::User.context(), secret),
            fridge_key: blake3::derive_key(TokenKind::Fridge.context(), secret),
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    fn key(&self, kind: TokenKind) -> &[u8; 32] {
        match kind {
            TokenKind::User => &self.user_key,
            TokenKind::Fridge => &self.fridge_key,
        }
    }

    pub fn issue_user_token(&self, user_id: i64) -> String {
        self.issue_at(TokenKind::User, user_id, Utc::now())
    }

    pub fn issue_fridge_token(&self, fridge_id: i64) -> String {
        self.issue_at(TokenKind::Fridge, fridge_id, Utc::now())
    }

    pub fn issue_at(&self, kind: TokenKind, subject_id: i64, now: DateTime<Utc>) -> String {
        let claims = Claims {
            sub: subject_id,
            kind,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.policy.lifetime(kind).ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp(),
        };
        // serializing a struct of integers and a unit enum cannot fail
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let mac = blake3::keyed_hash(self.key(kind), payload.as_bytes());
        debug!("Issued {:?} token for subject {}, expires at {}", kind, subject_id, claims.exp);
        format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(mac.as_bytes()))
    }

    /// Checks signature and kind only; expiry is judged by the caller.
    fn decode(&self, token: &str, expected: TokenKind) -> FridgeResult<Claims> {
        let (payload, signature) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| FridgeError::Unauthorized("malformed token".to_string()))?;
        let signature: [u8; 32] = URL_SAFE_NO_PAD
            .decode(signature)
            .ok()
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| FridgeError::Unauthorized("malformed token signature".to_string()))?;

        // blake3::Hash equality is constant time
        let expected_mac = blake3::keyed_hash(self.key(expected), payload.as_bytes());
        if expected_mac != blake3::Hash::from(signature) {
            warn!("Rejected {:?} token: bad signature or wrong token kind", expected);
            return Err(FridgeError::Unauthorized("invalid token signature".to_string()));
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| FridgeError::Unauthorized("malformed token claims".to_string()))?;
        if claims.kind != expected {
            warn!("Rejected token: expected {:?}, got {:?}", expected, claims.kind);
            return Err(FridgeError::Unauthorized("wrong token kind".to_string()));
        }
        if claims.iat > claims.exp {
            return Err(FridgeError::Unauthorized("token issued after its expiry".to_string()));
        }
        Ok(claims)
    }

    fn freshness(&self, claims: &Claims, now: DateTime<Utc>) -> Option<Freshness> {
        let exp = claims.expires_at();
        let renew_from = exp
            .checked_sub_signed(self.policy.lifetime(claims.kind).renew_before)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let grace_until = exp.checked_add_signed(self.policy.grace).unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now < renew_from {
            Some(Freshness::Fresh)
        } else if now < exp {
            Some(Freshness::ExpiringSoon)
        } else if now < grace_until {
            Some(Freshness::Grace)
        } else {
            None
        }
    }

    pub fn validate(&self, token: &str, expected: TokenKind) -> FridgeResult<Validated> {
        self.validate_at(token, expected, Utc::now())
    }

    pub fn validate_at(&self, token: &str, expected: TokenKind, now: DateTime<Utc>) -> FridgeResult<Validated> {
        let claims = self.decode(token, expected)?;
        match self.freshness(&claims, now) {
            Some(freshness) => Ok(Validated {
                subject_id: claims.sub,
                expires_at: claims.expires_at(),
                freshness,
            }),
            None => {
                warn!("Rejected {:?} token for subject {}: expired beyond grace", expected, claims.sub);
                Err(FridgeError::Unauthorized("token expired".to_string()))
            }
        }
    }

    /// Re-signs any token that still validates (including the grace window).
    pub fn renew(&self, token: &str, kind: TokenKind) -> FridgeResult<String> {
        self.renew_at(token, kind, Utc::now())
    }

    pub fn renew_at(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> FridgeResult<String> {
        let validated = self.validate_at(token, kind, now)?;
        Ok(self.issue_at(kind, validated.subject_id, now))
    }

    /// Returns the token to use from now on: unchanged when fresh, re-issued when
    /// it is close to or just past expiry.
    pub fn is_authorized(&self, token: &str, kind: TokenKind) -> FridgeResult<String> {
        self.is_authorized_at(token, kind, Utc::now()).map(|(token, _)| token)
    }

    pub fn is_authorized_at(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> FridgeResult<(String, i64)> {
        let validated = self.validate_at(token, kind, now)?;
        match validated.freshness {
            Freshness::Fresh => Ok((token.trim().to_string(), validated.subject_id)),
            Freshness::ExpiringSoon | Freshness::Grace => {
                debug!("Sliding renewal of {:?} token for subject {}", kind, validated.subject_id);
                Ok((self.issue_at(kind, validated.subject_id, now), validated.subject_id))
            }
        }
    }
}
