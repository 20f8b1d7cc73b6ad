//! The session registry: maps opaque session ids to the account that
//! logged in, where it logged in from, and when the session ends.
//!
//! Clients never see the session id in the clear. [`SessionRegistry::issue`]
//! hands out an HS256-signed token whose only claims are the session id and
//! its expiry, so:
//!
//! - a forged or altered token fails the signature check,
//! - a token for a revoked or expired session is rejected even though its
//!   signature is still good, because the id no longer exists here.
//!
//! # Expiry
//!
//! There is no background timer. Expired sessions are evicted lazily the
//! first time someone presents them to [`validate`](SessionRegistry::validate),
//! and [`purge_expired`](SessionRegistry::purge_expired) sweeps the rest.
//!
//! # Concurrency note
//!
//! Like the other registries, `SessionRegistry` is a plain owned struct. The
//! server keeps it behind its own lock.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::{AccountName, SessionError};

/// Length of a generated session id.
pub const SESSION_ID_LEN: usize = 64;

/// What the registry remembers about one session.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: AccountName,
    pub source: IpAddr,
    pub expires_at: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Token claims. Deliberately carries no account name.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sid: String,
    exp: u64,
}

/// Issues and checks signed session tokens.
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionRegistry {
    /// Creates an empty registry signing with the given HMAC secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The stored `expires_at` is authoritative; the `exp` claim is
        // informational for clients.
        validation.validate_exp = false;
        Self {
            sessions: HashMap::new(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Starts a session for `account` originating from `source`.
    ///
    /// Returns the signed token the client must present on `authenticate`.
    ///
    /// # Errors
    /// [`SessionError::TtlOutOfRange`] if `ttl` overflows the clock,
    /// [`SessionError::TokenEncoding`] if signing fails.
    pub fn issue(
        &mut self,
        account: AccountName,
        source: IpAddr,
        ttl: Duration,
    ) -> Result<String, SessionError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(SessionError::TtlOutOfRange(ttl))?;
        let sid = generate_session_id();
        let exp = SystemTime::now()
            .checked_add(ttl)
            .unwrap_or_else(SystemTime::now)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let token = encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sid: sid.clone(),
                exp,
            },
            &self.encoding_key,
        )
        .map_err(SessionError::TokenEncoding)?;

        tracing::info!(%account, %source, ttl_secs = ttl.as_secs(), "session issued");
        self.sessions.insert(
            sid,
            Session {
                account,
                source,
                expires_at,
            },
        );
        Ok(token)
    }

    /// Resolves a token to the account it was issued for.
    ///
    /// When `expected_source` is given, the session must have been issued
    /// to that same address.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: bad signature or format
    /// - [`SessionError::UnknownSession`]: revoked, purged or never issued
    /// - [`SessionError::Expired`]: past its expiry (and now evicted)
    /// - [`SessionError::SourceMismatch`]: presented from another address
    pub fn validate(
        &mut self,
        token: &str,
        expected_source: Option<IpAddr>,
    ) -> Result<AccountName, SessionError> {
        let sid = self.session_id(token)?;

        let session = self
            .sessions
            .get(&sid)
            .ok_or(SessionError::UnknownSession)?;

        if session.is_expired(Instant::now()) {
            let account = session.account.clone();
            self.sessions.remove(&sid);
            tracing::debug!(%account, "expired session evicted on lookup");
            return Err(SessionError::Expired);
        }

        if let Some(addr) = expected_source {
            if addr != session.source {
                tracing::warn!(
                    account = %session.account,
                    issued_to = %session.source,
                    presented_from = %addr,
                    "session token presented from a different address"
                );
                return Err(SessionError::SourceMismatch);
            }
        }

        Ok(session.account.clone())
    }

    /// Ends a session immediately (logout). Returns `false` if the token
    /// didn't name a live session.
    pub fn revoke(&mut self, token: &str) -> bool {
        match self.session_id(token) {
            Ok(sid) => self.sessions.remove(&sid).is_some(),
            Err(_) => false,
        }
    }

    /// Drops every expired session. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        let purged = before - self.sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }
        purged
    }

    /// Number of stored sessions, expired-but-not-yet-evicted included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_id(&self, token: &str) -> Result<String, SessionError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sid)
            .map_err(|_| SessionError::InvalidToken)
    }
}

fn generate_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
