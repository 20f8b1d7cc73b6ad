//! Lobby registry: creates, finds and garbage-collects lobbies.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distr::Alphanumeric;
use skirmish_protocol::{LobbyId, LobbyListEntry};

use crate::{GameConfig, Lobby, LobbyError, LobbyKind};

/// Prefix of every public lobby id.
pub const PUBLIC_PREFIX: &str = "public-";

/// Length of a generated private lobby id.
pub const PRIVATE_ID_LEN: usize = 8;

/// Owns every live lobby.
///
/// A `BTreeMap` keeps iteration (ticking, listing) in a stable id order.
#[derive(Debug, Default)]
pub struct LobbyRegistry {
    lobbies: BTreeMap<LobbyId, Lobby>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an empty private lobby under a fresh random id.
    pub fn create_private(&mut self, rng: &mut impl Rng) -> LobbyId {
        let id = loop {
            let candidate: String = (0..PRIVATE_ID_LEN)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect();
            let candidate = LobbyId::new(candidate);
            if !self.lobbies.contains_key(&candidate) {
                break candidate;
            }
        };
        self.lobbies
            .insert(id.clone(), Lobby::new(id.clone(), LobbyKind::Private));
        tracing::info!(lobby_id = %id, kind = "private", "lobby created");
        id
    }

    /// Pre-allocates `count` public lobbies named `public-0`,
    /// `public-1`, ... Existing ones are left alone.
    pub fn create_public_pool(&mut self, count: usize) -> Vec<LobbyId> {
        (0..count)
            .map(|n| {
                let id = LobbyId::new(format!("{PUBLIC_PREFIX}{n}"));
                self.lobbies.entry(id.clone()).or_insert_with(|| {
                    tracing::info!(lobby_id = %id, kind = "public", "lobby created");
                    Lobby::new(id.clone(), LobbyKind::Public)
                });
                id
            })
            .collect()
    }

    /// # Errors
    /// [`LobbyError::NotFound`] if no lobby has this id.
    pub fn get(&self, id: &LobbyId) -> Result<&Lobby, LobbyError> {
        self.lobbies
            .get(id)
            .ok_or_else(|| LobbyError::NotFound(id.clone()))
    }

    /// # Errors
    /// [`LobbyError::NotFound`] if no lobby has this id.
    pub fn get_mut(&mut self, id: &LobbyId) -> Result<&mut Lobby, LobbyError> {
        self.lobbies
            .get_mut(id)
            .ok_or_else(|| LobbyError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &LobbyId) -> bool {
        self.lobbies.contains_key(id)
    }

    /// Public lobbies with their connected player counts.
    pub fn list_public(&self) -> Vec<LobbyListEntry> {
        self.lobbies
            .values()
            .filter(|lobby| lobby.kind() == LobbyKind::Public)
            .map(|lobby| LobbyListEntry {
                id: lobby.id().clone(),
                players: lobby.player_count(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lobby> {
        self.lobbies.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Lobby> {
        self.lobbies.values_mut()
    }

    /// Removes every expired private lobby and returns their ids.
    pub fn collect_expired(&mut self, config: &GameConfig) -> Vec<LobbyId> {
        let mut removed = Vec::new();
        self.lobbies.retain(|id, lobby| {
            if lobby.is_expired(config) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        for id in &removed {
            tracing::info!(lobby_id = %id, "lobby timed out, removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_create_private_returns_unique_alphanumeric_ids() {
        let mut registry = LobbyRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        let a = registry.create_private(&mut rng);
        let b = registry.create_private(&mut rng);

        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), PRIVATE_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(a.validate().is_ok());
        assert_eq!(registry.get(&a).unwrap().kind(), LobbyKind::Private);
    }

    #[test]
    fn test_create_public_pool_is_idempotent() {
        let mut registry = LobbyRegistry::new();
        let ids = registry.create_public_pool(3);
        assert_eq!(ids[2].as_str(), "public-2");
        registry.create_public_pool(3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_get_unknown_returns_not_found() {
        let registry = LobbyRegistry::new();
        let result = registry.get(&LobbyId::new("nope"));
        assert!(matches!(result, Err(LobbyError::NotFound(_))));
    }

    #[test]
    fn test_list_public_excludes_private() {
        let mut registry = LobbyRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        registry.create_public_pool(2);
        let private = registry.create_private(&mut rng);

        let listing = registry.list_public();
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().all(|entry| entry.id != private));
        assert!(listing.iter().all(|entry| entry.players == 0));
    }
}
