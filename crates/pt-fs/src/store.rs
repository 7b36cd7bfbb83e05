use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use pt_core::{CoreError, CoreResult, InventoryItem, InventoryStore, ItemDocument, ItemName, UserId};
use pt_utils::storage_key;

use crate::{read_yaml, run_blocking, write_yaml};

/// Document store keeping one YAML file per item under a per-user directory.
///
/// Writes are plain read-modify-write against the filesystem with no locking,
/// so two processes updating the same item race and the last write wins.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at the `users` directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn items_root(&self, user: &UserId) -> PathBuf {
        self.root.join(storage_key(user.as_str())).join("items")
    }

    fn item_path(&self, user: &UserId, name: &ItemName) -> PathBuf {
        self.items_root(user)
            .join(format!("{}.yaml", storage_key(name.as_str())))
    }

    fn list_items(&self, user: &UserId) -> CoreResult<Vec<InventoryItem>> {
        let items_root = self.items_root(user);
        if !items_root.exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        for entry in WalkDir::new(&items_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = entry.map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            let Some(item) = read_yaml::<InventoryItem>(entry.path())? else {
                continue;
            };
            // Only files stored under their own name's key can be read back by name.
            let expected = storage_key(item.name.as_str());
            if entry.path().file_stem().and_then(|stem| stem.to_str()) != Some(expected.as_str()) {
                warn!(path = %entry.path().display(), item = %item.name, "skipping misplaced item file");
                continue;
            }
            items.push(item);
        }
        Ok(items)
    }

    fn read_item(&self, user: &UserId, name: &ItemName) -> CoreResult<Option<ItemDocument>> {
        let item = read_yaml::<InventoryItem>(&self.item_path(user, name))?;
        Ok(item.map(|item| ItemDocument {
            quantity: item.quantity,
            image_url: item.image_url,
        }))
    }

    fn write_item(&self, user: &UserId, name: &ItemName, document: &ItemDocument) -> CoreResult<()> {
        let item = InventoryItem::from_document(name.clone(), document.clone());
        write_yaml(&self.item_path(user, name), &item)
    }

    fn remove_item(&self, user: &UserId, name: &ItemName) -> CoreResult<()> {
        let path = self.item_path(user, name);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(path).map_err(|err| CoreError::StoreUnavailable(err.to_string()))
    }
}

#[async_trait]
impl InventoryStore for FsStore {
    async fn list_all(&self, user: &UserId) -> CoreResult<Vec<InventoryItem>> {
        let store = self.clone();
        let user = user.clone();
        run_blocking(move || store.list_items(&user)).await
    }

    async fn get(&self, user: &UserId, name: &ItemName) -> CoreResult<Option<ItemDocument>> {
        let store = self.clone();
        let (user, name) = (user.clone(), name.clone());
        run_blocking(move || store.read_item(&user, &name)).await
    }

    async fn set(&self, user: &UserId, name: &ItemName, document: &ItemDocument) -> CoreResult<()> {
        debug!(user = %user, item = %name, quantity = document.quantity, "writing item");
        let store = self.clone();
        let (user, name, document) = (user.clone(), name.clone(), document.clone());
        run_blocking(move || store.write_item(&user, &name, &document)).await
    }

    async fn delete(&self, user: &UserId, name: &ItemName) -> CoreResult<()> {
        debug!(user = %user, item = %name, "deleting item");
        let store = self.clone();
        let (user, name) = (user.clone(), name.clone());
        run_blocking(move || store.remove_item(&user, &name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(raw: &str) -> ItemName {
        ItemName::new(raw).unwrap()
    }

    #[tokio::test]
    async fn set_get_list_delete() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsStore::new(temp.path().to_path_buf());
        let user = UserId::new("user-1");

        assert!(store.list_all(&user).await.unwrap().is_empty());
        assert!(store.get(&user, &name("milk")).await.unwrap().is_none());

        store
            .set(&user, &name("milk"), &ItemDocument::with_quantity(2))
            .await
            .unwrap();
        store
            .set(
                &user,
                &name("eggs"),
                &ItemDocument {
                    quantity: 12,
                    image_url: Some("file:///tmp/eggs.png".into()),
                },
            )
            .await
            .unwrap();

        let eggs = store.get(&user, &name("eggs")).await.unwrap().unwrap();
        assert_eq!(eggs.quantity, 12);
        assert_eq!(eggs.image_url.as_deref(), Some("file:///tmp/eggs.png"));

        let names: Vec<_> = store
            .list_all(&user)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["eggs", "milk"]);

        store.delete(&user, &name("milk")).await.unwrap();
        assert!(store.get(&user, &name("milk")).await.unwrap().is_none());
        assert_eq!(store.list_all(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_of_missing_item_is_ok() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsStore::new(temp.path().to_path_buf());
        store
            .delete(&UserId::new("user-1"), &name("ghost"))
            .await
            .expect("no-op delete");
    }

    #[tokio::test]
    async fn users_do_not_see_each_other() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsStore::new(temp.path().to_path_buf());
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .set(&alice, &name("flour"), &ItemDocument::with_quantity(1))
            .await
            .unwrap();

        assert!(store.list_all(&bob).await.unwrap().is_empty());
        assert_eq!(store.list_all(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hand_edited_names_load_normalized_and_stay_addressable() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsStore::new(temp.path().to_path_buf());
        let user = UserId::new("user-1");
        let milk = name("milk");

        let items_root = store.items_root(&user);
        fs::create_dir_all(&items_root).unwrap();
        fs::write(store.item_path(&user, &milk), "name: ' Milk'\nquantity: 2\n").unwrap();
        fs::write(items_root.join("stray.yaml"), "name: sugar\nquantity: 1\n").unwrap();

        let items = store.list_all(&user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, milk);
        assert_eq!(store.get(&user, &milk).await.unwrap().unwrap().quantity, 2);

        store.delete(&user, &milk).await.unwrap();
        assert!(store.list_all(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_the_whole_document() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsStore::new(temp.path().to_path_buf());
        let user = UserId::new("user-1");

        store
            .set(&user, &name("rice"), &ItemDocument::with_quantity(3))
            .await
            .unwrap();
        store
            .set(&user, &name("rice"), &ItemDocument::with_quantity(7))
            .await
            .unwrap();

        let items = store.list_all(&user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 7);
    }
}
