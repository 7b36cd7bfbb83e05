use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use pt_core::{InventoryItem, RecipeSuggestion};

/// Snapshots held by a session. Each list is swapped as a whole, so readers
/// always see a complete load.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    view: RwLock<Arc<Vec<InventoryItem>>>,
    suggestions: RwLock<Arc<Vec<RecipeSuggestion>>>,
    generation: AtomicU64,
}

impl SessionState {
    pub(crate) fn view(&self) -> Arc<Vec<InventoryItem>> {
        Arc::clone(&self.view.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn replace_view(&self, items: Vec<InventoryItem>) -> Arc<Vec<InventoryItem>> {
        let items = Arc::new(items);
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&items);
        items
    }

    pub(crate) fn suggestions(&self) -> Arc<Vec<RecipeSuggestion>> {
        Arc::clone(&self.suggestions.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reserve a ticket for a recommendation refresh.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `suggestions` unless a newer refresh has been started since
    /// `generation` was issued. Returns whatever list is current afterwards.
    pub(crate) fn replace_suggestions(
        &self,
        generation: u64,
        suggestions: Vec<RecipeSuggestion>,
    ) -> Arc<Vec<RecipeSuggestion>> {
        let mut current = self
            .suggestions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) == generation {
            *current = Arc::new(suggestions);
        }
        Arc::clone(&current)
    }
}
