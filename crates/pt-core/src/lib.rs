//! Core domain entities, rules, and ports for Pantry.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

pub mod memory;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by domain rules and the external ports.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Returned when input is rejected before any store access.
    #[error("validation error: {0}")]
    Validation(String),
    /// Returned by the identity provider for bad credentials or duplicate accounts.
    #[error("authentication error: {0}")]
    Auth(String),
    /// Returned when the document or blob store cannot be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Returned when the recommendation service fails. Never fatal.
    #[error("recommendation failed: {0}")]
    RecommendationFailed(String),
}

/// An item name normalized for use as a storage key.
///
/// Names are trimmed and lowercased, so `" Milk "` and `"milk"` address the
/// same record. Deserialized names go through the same normalization.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ItemName {
    value: String,
}

impl ItemName {
    /// Normalize a raw name, rejecting empty or whitespace-only values.
    pub fn new(raw: impl AsRef<str>) -> CoreResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("item name cannot be empty".into()));
        }
        Ok(Self {
            value: trimmed.to_lowercase(),
        })
    }

    /// Access the normalized name.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl TryFrom<String> for ItemName {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<ItemName> for String {
    fn from(name: ItemName) -> Self {
        name.value
    }
}

/// A strictly positive amount supplied by a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Count(u32);

impl Count {
    /// Validate a raw count, rejecting zero, negatives, and values that do not fit a quantity.
    pub fn new(raw: i64) -> CoreResult<Self> {
        if raw <= 0 {
            return Err(CoreError::Validation(format!(
                "count must be a positive integer, got {raw}"
            )));
        }
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| CoreError::Validation(format!("count {raw} is too large")))
    }

    /// Access the raw value.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// The stored body of an inventory record, keyed externally by [`ItemName`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ItemDocument {
    /// Current count on hand. Never persisted as zero.
    pub quantity: u32,
    /// Optional captured photo of the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ItemDocument {
    /// Create a document without an image.
    pub fn with_quantity(quantity: u32) -> Self {
        Self {
            quantity,
            image_url: None,
        }
    }
}

/// A single entry of a user's inventory view.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct InventoryItem {
    /// Normalized name, unique per user.
    pub name: ItemName,
    /// Count on hand.
    pub quantity: u32,
    /// Optional captured photo of the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl InventoryItem {
    /// Join a key with its stored document.
    pub fn from_document(name: ItemName, document: ItemDocument) -> Self {
        Self {
            name,
            quantity: document.quantity,
            image_url: document.image_url,
        }
    }
}

/// Return the items whose name contains `query`, case-insensitively, in their original order.
pub fn filter_items(items: &[InventoryItem], query: &str) -> Vec<InventoryItem> {
    let query = query.to_lowercase();
    items
        .iter()
        .filter(|item| item.name.as_str().contains(&query))
        .cloned()
        .collect()
}

/// A candidate recipe title produced by the recommendation service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RecipeSuggestion {
    /// Display title.
    pub title: String,
}

impl RecipeSuggestion {
    /// Split a completion into one suggestion per non-blank line.
    pub fn parse_completion(text: &str) -> Vec<Self> {
        text.lines()
            .map(|line| strip_list_marker(line.trim()))
            .filter(|title| !title.is_empty())
            .map(|title| Self {
                title: title.to_string(),
            })
            .collect()
    }
}

fn strip_list_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }
    line
}

/// Opaque identifier handed out by the identity provider.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a provider-issued identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated user.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    /// Provider-issued identifier.
    pub id: UserId,
    /// Sign-in email.
    pub email: String,
}

/// How a notice should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// The operation completed.
    Success,
    /// Informational only.
    Info,
    /// The operation failed or a background task reported a problem.
    Error,
}

/// A transient, human-readable message for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Presentation hint.
    pub severity: Severity,
    /// Text shown to the user.
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl From<&CoreError> for Notice {
    fn from(err: &CoreError) -> Self {
        match err {
            // Provider messages are shown verbatim.
            CoreError::Auth(message) => Notice::error(message.clone()),
            other => Notice::error(other.to_string()),
        }
    }
}

/// Per-user document store holding one record per normalized item name.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Fetch every record for a user.
    async fn list_all(&self, user: &UserId) -> CoreResult<Vec<InventoryItem>>;
    /// Fetch a single record, or `None` if absent.
    async fn get(&self, user: &UserId, name: &ItemName) -> CoreResult<Option<ItemDocument>>;
    /// Create or replace a record.
    async fn set(&self, user: &UserId, name: &ItemName, document: &ItemDocument) -> CoreResult<()>;
    /// Delete a record. Absent records are not an error.
    async fn delete(&self, user: &UserId, name: &ItemName) -> CoreResult<()>;
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    async fn register(&self, email: &str, password: &str) -> CoreResult<User>;
    /// Sign in an existing account.
    async fn login(&self, email: &str, password: &str) -> CoreResult<User>;
    /// Sign out the current user, if any.
    async fn logout(&self) -> CoreResult<()>;
    /// The currently signed-in user.
    fn current_user(&self) -> Option<User>;
    /// Receive every change of the signed-in user.
    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

/// Text-completion service used for recipe suggestions.
#[async_trait]
pub trait RecommendationService: Send + Sync {
    /// Complete a prompt, returning free-form text.
    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

/// Blob store for captured images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store base64 image data at `path` and return a URL for it.
    async fn put(&self, path: &str, base64_data: &str) -> CoreResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, quantity: u32) -> InventoryItem {
        InventoryItem::from_document(
            ItemName::new(name).unwrap(),
            ItemDocument::with_quantity(quantity),
        )
    }

    #[test]
    fn item_name_normalizes_case_and_whitespace() {
        let name = ItemName::new("  Olive Oil ").unwrap();
        assert_eq!(name.as_str(), "olive oil");
    }

    #[test]
    fn item_name_rejects_empty() {
        let result = ItemName::new("   ");
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn converted_names_are_normalized() {
        let name = ItemName::try_from(String::from(" Brown Sugar")).unwrap();
        assert_eq!(String::from(name), "brown sugar");
        assert!(ItemName::try_from(String::new()).is_err());
    }

    #[test]
    fn count_rejects_non_positive() {
        assert!(matches!(Count::new(0), Err(CoreError::Validation(_))));
        assert!(matches!(Count::new(-3), Err(CoreError::Validation(_))));
        assert!(matches!(
            Count::new(i64::from(u32::MAX) + 1),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(Count::new(4).unwrap().get(), 4);
    }

    #[test]
    fn empty_query_keeps_every_item() {
        let items = vec![item("milk", 2), item("eggs", 12)];
        assert_eq!(filter_items(&items, ""), items);
    }

    #[test]
    fn query_matches_substring_and_preserves_order() {
        let items = vec![
            item("oat milk", 1),
            item("eggs", 12),
            item("milk", 2),
            item("flour", 1),
        ];
        let names: Vec<_> = filter_items(&items, "MILK")
            .into_iter()
            .map(|item| item.name.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["oat milk", "milk"]);
    }

    #[test]
    fn completion_splits_into_titles() {
        let text = "1. Pancakes\n\n- French Toast \n* Omelette\n  Custard  \n2) Crepes\n";
        let titles: Vec<_> = RecipeSuggestion::parse_completion(text)
            .into_iter()
            .map(|suggestion| suggestion.title)
            .collect();
        assert_eq!(
            titles,
            vec!["Pancakes", "French Toast", "Omelette", "Custard", "Crepes"]
        );
    }

    #[test]
    fn completion_keeps_titles_that_start_with_numbers() {
        let titles = RecipeSuggestion::parse_completion("3-Bean Chili");
        assert_eq!(titles[0].title, "3-Bean Chili");
    }

    #[test]
    fn auth_errors_are_shown_verbatim() {
        let notice = Notice::from(&CoreError::Auth("email already in use".into()));
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.message, "email already in use");

        let notice = Notice::from(&CoreError::StoreUnavailable("disk full".into()));
        assert_eq!(notice.message, "store unavailable: disk full");
    }
}
