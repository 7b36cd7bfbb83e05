//! Test doubles for the external ports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pt_core::memory::MemoryStore;
use pt_core::{BlobStore, CoreError, CoreResult, IdentityProvider, RecommendationService};

use crate::Services;

/// Replays queued completions and records every prompt. An empty queue
/// answers with an empty completion.
#[derive(Default)]
pub(crate) struct ScriptedRecommender {
    responses: Mutex<VecDeque<CoreResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedRecommender {
    pub(crate) fn push(&self, response: CoreResult<String>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationService for ScriptedRecommender {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[derive(Default)]
pub(crate) struct MemoryBlobs {
    paths: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl MemoryBlobs {
    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, path: &str, _base64_data: &str) -> CoreResult<String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable("upload rejected".into()));
        }
        self.paths.lock().unwrap().push(path.to_string());
        Ok(format!("mem://{path}"))
    }
}

/// A signed-out identity provider for tests that never authenticate.
struct NoIdentity {
    current: tokio::sync::watch::Sender<Option<pt_core::User>>,
}

#[async_trait]
impl IdentityProvider for NoIdentity {
    async fn register(&self, _email: &str, _password: &str) -> CoreResult<pt_core::User> {
        Err(CoreError::Auth("registration disabled".into()))
    }

    async fn login(&self, _email: &str, _password: &str) -> CoreResult<pt_core::User> {
        Err(CoreError::Auth("login disabled".into()))
    }

    async fn logout(&self) -> CoreResult<()> {
        Ok(())
    }

    fn current_user(&self) -> Option<pt_core::User> {
        None
    }

    fn subscribe(&self) -> tokio::sync::watch::Receiver<Option<pt_core::User>> {
        self.current.subscribe()
    }
}

pub(crate) fn services(
    store: Arc<MemoryStore>,
    recommender: Arc<ScriptedRecommender>,
    blobs: Arc<MemoryBlobs>,
) -> Services {
    let (current, _) = tokio::sync::watch::channel(None);
    Services {
        identity: Arc::new(NoIdentity { current }),
        store,
        recommender,
        blobs,
    }
}
