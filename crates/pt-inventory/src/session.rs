use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pt_core::{
    filter_items, BlobStore, Count, CoreError, CoreResult, InventoryItem, InventoryStore,
    ItemDocument, ItemName, Notice, RecipeSuggestion, RecommendationService, User,
};

use crate::recommend;
use crate::state::SessionState;
use crate::Services;

/// Receives notices produced by background work, such as a failed
/// recommendation refresh.
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// The inventory reconciler for one signed-in user.
///
/// Every mutation is a read-modify-write against the store followed by a
/// full reload of the view. Nothing serializes overlapping mutations of the
/// same item: two concurrent writers both read the old quantity and the later
/// write wins.
pub struct Session {
    user: User,
    store: Arc<dyn InventoryStore>,
    recommender: Arc<dyn RecommendationService>,
    blobs: Arc<dyn BlobStore>,
    state: Arc<SessionState>,
    notices: mpsc::UnboundedSender<Notice>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Start an empty session. Call [`Session::refresh`] to load the view.
    pub fn open(user: User, services: &Services) -> (Self, NoticeReceiver) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let session = Self {
            user,
            store: Arc::clone(&services.store),
            recommender: Arc::clone(&services.recommender),
            blobs: Arc::clone(&services.blobs),
            state: Arc::new(SessionState::default()),
            notices,
            background: Mutex::new(Vec::new()),
        };
        (session, receiver)
    }

    /// The user this session belongs to.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Latest loaded inventory.
    pub fn view(&self) -> Arc<Vec<InventoryItem>> {
        self.state.view()
    }

    /// Latest recipe suggestions.
    pub fn suggestions(&self) -> Arc<Vec<RecipeSuggestion>> {
        self.state.suggestions()
    }

    /// Items whose name contains `query`, case-insensitively, in view order.
    pub fn filtered_view(&self, query: &str) -> Vec<InventoryItem> {
        filter_items(&self.state.view(), query)
    }

    /// Reload the full item set and start a background recommendation refresh.
    ///
    /// On failure the previous view stays in place.
    pub async fn refresh(&self) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let items = self.store.list_all(&self.user.id).await.map_err(|err| {
            warn!(user = %self.user.id, error = %err, "inventory reload failed");
            err
        })?;
        let view = self.state.replace_view(items);
        debug!(user = %self.user.id, items = view.len(), "inventory reloaded");
        self.spawn_recommendations(&view);
        Ok(view)
    }

    /// Add `count` to an item, creating it if needed.
    pub async fn add_item(&self, name: &str, count: i64) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let name = ItemName::new(name)?;
        let count = Count::new(count)?;
        self.write_add(&name, count, None).await?;
        info!(user = %self.user.id, item = %name, count = count.get(), "added item");
        self.refresh().await
    }

    /// Take `count` away from an item, deleting it once nothing is left.
    /// Unknown items are ignored.
    pub async fn remove_item(&self, name: &str, count: i64) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let name = ItemName::new(name)?;
        let count = Count::new(count)?;
        self.write_remove(&name, Some(count)).await?;
        info!(user = %self.user.id, item = %name, count = count.get(), "removed item");
        self.refresh().await
    }

    /// Delete an item regardless of its quantity.
    pub async fn remove_all(&self, name: &str) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let name = ItemName::new(name)?;
        self.write_remove(&name, None).await?;
        info!(user = %self.user.id, item = %name, "removed all of item");
        self.refresh().await
    }

    /// Rename and/or recount an item.
    ///
    /// When the raw names differ the original is removed entirely and
    /// `new_count` is added to `new_name`, merging into any existing record.
    /// When they are identical the stored quantity is overwritten. The
    /// comparison runs on the caller's text before normalization.
    pub async fn edit_item(
        &self,
        original_name: &str,
        new_name: &str,
        new_count: i64,
    ) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let target = ItemName::new(new_name)?;
        let count = Count::new(new_count)?;
        let original = ItemName::new(original_name)?;

        if original_name == new_name {
            let image_url = self
                .store
                .get(&self.user.id, &target)
                .await?
                .and_then(|document| document.image_url);
            let document = ItemDocument {
                quantity: count.get(),
                image_url,
            };
            self.store.set(&self.user.id, &target, &document).await?;
        } else {
            // The merge is checked before the original is touched. A case-only
            // edit addresses the original's own record, which is about to go.
            let existing = if original == target {
                None
            } else {
                self.store.get(&self.user.id, &target).await?
            };
            let document = merged(&target, existing, count, None)?;
            self.write_remove(&original, None).await?;
            self.store.set(&self.user.id, &target, &document).await?;
        }

        info!(
            user = %self.user.id,
            from = %original,
            to = %target,
            count = count.get(),
            "edited item"
        );
        self.refresh().await
    }

    /// Upload a captured photo and add the item with the photo attached.
    ///
    /// Nothing is written to the inventory if the upload fails.
    pub async fn capture_item(
        &self,
        name: &str,
        count: i64,
        image_data: &str,
    ) -> CoreResult<Arc<Vec<InventoryItem>>> {
        let name = ItemName::new(name)?;
        let count = Count::new(count)?;
        let path = format!(
            "{}/{}.{}",
            pt_utils::storage_key(self.user.id.as_str()),
            pt_utils::storage_key(name.as_str()),
            pt_utils::image_extension(image_data)
        );
        let url = self.blobs.put(&path, image_data).await?;
        self.write_add(&name, count, Some(url)).await?;
        info!(user = %self.user.id, item = %name, count = count.get(), "captured item");
        self.refresh().await
    }

    /// Ask the recommendation service for recipes using `names` and replace
    /// the suggestion list. On failure the list is unchanged.
    pub async fn refresh_recommendations(
        &self,
        names: &[ItemName],
    ) -> CoreResult<Arc<Vec<RecipeSuggestion>>> {
        let generation = self.state.next_generation();
        recommend::refresh(self.recommender.as_ref(), &self.state, generation, names).await
    }

    /// Wait for the most recent background recommendation refresh.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.lock_background());
        for handle in handles {
            match handle.await {
                Err(err) if !err.is_cancelled() => {
                    warn!(error = %err, "recommendation task ended abnormally");
                }
                _ => {}
            }
        }
    }

    async fn write_add(
        &self,
        name: &ItemName,
        count: Count,
        image_url: Option<String>,
    ) -> CoreResult<()> {
        let existing = self.store.get(&self.user.id, name).await?;
        let document = merged(name, existing, count, image_url)?;
        self.store.set(&self.user.id, name, &document).await
    }

    /// `None` removes everything.
    async fn write_remove(&self, name: &ItemName, count: Option<Count>) -> CoreResult<()> {
        let Some(existing) = self.store.get(&self.user.id, name).await? else {
            debug!(user = %self.user.id, item = %name, "nothing to remove");
            return Ok(());
        };
        match count {
            Some(count) if count.get() < existing.quantity => {
                let document = ItemDocument {
                    quantity: existing.quantity - count.get(),
                    image_url: existing.image_url,
                };
                self.store.set(&self.user.id, name, &document).await
            }
            _ => self.store.delete(&self.user.id, name).await,
        }
    }

    fn spawn_recommendations(&self, view: &[InventoryItem]) {
        let names: Vec<ItemName> = view.iter().map(|item| item.name.clone()).collect();
        let generation = self.state.next_generation();
        let recommender = Arc::clone(&self.recommender);
        let state = Arc::clone(&self.state);
        let notices = self.notices.clone();

        let handle = tokio::spawn(async move {
            if let Err(err) =
                recommend::refresh(recommender.as_ref(), &state, generation, &names).await
            {
                // The receiver is gone once the session is discarded.
                let _ = notices.send(Notice::from(&err));
            }
        });

        // Older refreshes would lose the generation check anyway.
        let mut background = self.lock_background();
        for task in background.drain(..) {
            task.abort();
        }
        background.push(handle);
    }

    fn lock_background(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The document left after adding `count` to `existing`. A new image replaces
/// the stored one; otherwise the stored one is kept.
fn merged(
    name: &ItemName,
    existing: Option<ItemDocument>,
    count: Count,
    image_url: Option<String>,
) -> CoreResult<ItemDocument> {
    match existing {
        Some(existing) => Ok(ItemDocument {
            quantity: existing.quantity.checked_add(count.get()).ok_or_else(|| {
                CoreError::Validation(format!("quantity of {name} would overflow"))
            })?,
            image_url: image_url.or(existing.image_url),
        }),
        None => Ok(ItemDocument {
            quantity: count.get(),
            image_url,
        }),
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for handle in self.lock_background().drain(..) {
            handle.abort();
        }
    }
}
