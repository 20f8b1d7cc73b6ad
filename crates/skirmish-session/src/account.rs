//! The account boundary.
//!
//! Registration, password hashing and persistence live outside the game
//! core. The server only needs to read an account's name and admin flag,
//! so that is all [`AccountStore`] exposes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Shortest accepted account name.
pub const MIN_NAME_LEN: usize = 3;
/// Longest accepted account name.
pub const MAX_NAME_LEN: usize = 16;

// ---------------------------------------------------------------------------
// AccountName
// ---------------------------------------------------------------------------

/// A validated account name: 3 to 16 ASCII alphanumerics.
///
/// The only way to build one is [`AccountName::parse`], so holding an
/// `AccountName` proves the string already passed validation.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    /// Validates and wraps a raw account name.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidAccountName`] when the length is out
    /// of range or the name contains anything but `[A-Za-z0-9]`.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let len_ok = (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&raw.len());
        if len_ok && raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(SessionError::InvalidAccountName(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountName {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Lifetime statistics kept by the account store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub kills: u64,
    pub deaths: u64,
    pub games_played: u64,
}

/// A registered user, as the account store knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    /// Opaque to the game core; produced and checked by the login service.
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(default)]
    pub stats: AccountStats,
}

impl Account {
    /// A non-admin account with empty stats.
    pub fn new(name: AccountName, password_hash: impl Into<String>) -> Self {
        Self {
            name,
            password_hash: password_hash.into(),
            is_admin: false,
            stats: AccountStats::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

/// Read access to the external account store.
///
/// `Send + Sync + 'static` because one store is shared by every
/// connection task for the lifetime of the server.
pub trait AccountStore: Send + Sync + 'static {
    /// Looks up an account by name.
    fn lookup(&self, name: &AccountName) -> Option<Account>;
}

/// An [`AccountStore`] backed by a `HashMap`, for development servers and
/// tests.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: HashMap<AccountName, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.name.clone(), account);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_account(mut self, account: Account) -> Self {
        self.insert(account);
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for MemoryAccountStore {
    fn lookup(&self, name: &AccountName) -> Option<Account> {
        self.accounts.get(name).cloned()
    }
}
