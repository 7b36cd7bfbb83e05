//! In-memory document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::{CoreError, CoreResult, InventoryItem, InventoryStore, ItemDocument, ItemName, UserId};

/// Store that keeps every user's records in process memory.
///
/// Listings are ordered by name. Availability can be switched off to
/// simulate an unreachable backend.
#[derive(Debug)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, BTreeMap<ItemName, ItemDocument>>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call succeed or fail with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StoreUnavailable("memory store is offline".into()))
        }
    }

    fn with_user<T>(
        &self,
        user: &UserId,
        f: impl FnOnce(&mut BTreeMap<ItemName, ItemDocument>) -> T,
    ) -> CoreResult<T> {
        self.check()?;
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(users.entry(user.clone()).or_default()))
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn list_all(&self, user: &UserId) -> CoreResult<Vec<InventoryItem>> {
        self.with_user(user, |items| {
            items
                .iter()
                .map(|(name, document)| InventoryItem::from_document(name.clone(), document.clone()))
                .collect()
        })
    }

    async fn get(&self, user: &UserId, name: &ItemName) -> CoreResult<Option<ItemDocument>> {
        self.with_user(user, |items| items.get(name).cloned())
    }

    async fn set(&self, user: &UserId, name: &ItemName, document: &ItemDocument) -> CoreResult<()> {
        self.with_user(user, |items| {
            items.insert(name.clone(), document.clone());
        })
    }

    async fn delete(&self, user: &UserId, name: &ItemName) -> CoreResult<()> {
        self.with_user(user, |items| {
            items.remove(name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_scoped_per_user() {
        let store = MemoryStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let milk = ItemName::new("milk").unwrap();

        store
            .set(&alice, &milk, &ItemDocument::with_quantity(2))
            .await
            .unwrap();

        assert_eq!(store.list_all(&alice).await.unwrap().len(), 1);
        assert!(store.list_all(&bob).await.unwrap().is_empty());
        assert!(store.get(&bob, &milk).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);
        let result = store.list_all(&UserId::new("alice")).await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
    }
}
