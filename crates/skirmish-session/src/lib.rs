//! Player identity for Skirmish.
//!
//! 1. **Accounts**: who a player is ([`AccountName`], [`Account`]) and
//!    read access to the external store ([`AccountStore`]).
//! 2. **Sessions**: proof that a player logged in ([`SessionRegistry`]),
//!    carried by the client as a signed token.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← resolves `authenticate` tokens to accounts
//!     ↕
//! Session Layer (this crate)
//! ```

mod account;
mod error;
mod registry;

pub use account::{
    Account, AccountName, AccountStats, AccountStore, MAX_NAME_LEN,
    MIN_NAME_LEN, MemoryAccountStore,
};
pub use error::SessionError;
pub use registry::{SESSION_ID_LEN, Session, SessionRegistry};
