use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use pt_core::{
    BlobStore, CoreError, CoreResult, IdentityProvider, InventoryStore, Notice,
    RecommendationService, User,
};

use crate::session::{NoticeReceiver, Session};

/// The external collaborators a pantry is wired to.
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn InventoryStore>,
    pub recommender: Arc<dyn RecommendationService>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Owns the session of whoever is signed in.
///
/// The session is rebuilt from scratch whenever the identity provider reports
/// a different user, and dropped on sign-out.
pub struct Pantry {
    services: Services,
    user_changes: watch::Receiver<Option<User>>,
    session: Option<Session>,
    notices: Option<NoticeReceiver>,
}

impl Pantry {
    pub fn new(services: Services) -> Self {
        let user_changes = services.identity.subscribe();
        Self {
            services,
            user_changes,
            session: None,
            notices: None,
        }
    }

    pub async fn register(&mut self, email: &str, password: &str) -> CoreResult<&Session> {
        self.services.identity.register(email, password).await?;
        self.sync_with_identity().await?;
        self.session()
    }

    pub async fn login(&mut self, email: &str, password: &str) -> CoreResult<&Session> {
        self.services.identity.login(email, password).await?;
        self.sync_with_identity().await?;
        self.session()
    }

    pub async fn logout(&mut self) -> CoreResult<()> {
        self.services.identity.logout().await?;
        self.sync_with_identity().await
    }

    /// Open a session for a sign-in that happened before this pantry existed.
    pub async fn resume(&mut self) -> CoreResult<Option<&Session>> {
        self.sync_with_identity().await?;
        Ok(self.session.as_ref())
    }

    /// Wait for the identity provider to report a different user, then
    /// rebuild the session to match.
    pub async fn wait_for_user_change(&mut self) -> CoreResult<()> {
        self.user_changes
            .changed()
            .await
            .map_err(|_| CoreError::Auth("identity provider is gone".into()))?;
        self.sync_with_identity().await
    }

    /// The active session, or `Auth` when nobody is signed in.
    pub fn session(&self) -> CoreResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| CoreError::Auth("not signed in".into()))
    }

    /// Drain notices produced by background work since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        let mut drained = Vec::new();
        if let Some(receiver) = self.notices.as_mut() {
            while let Ok(notice) = receiver.try_recv() {
                drained.push(notice);
            }
        }
        drained
    }

    async fn sync_with_identity(&mut self) -> CoreResult<()> {
        let current = self.user_changes.borrow_and_update().clone();
        let active = self.session.as_ref().map(|session| session.user().id.clone());

        match current {
            Some(user) if active.as_ref() == Some(&user.id) => Ok(()),
            Some(user) => {
                info!(user = %user.id, "opening session");
                let (session, notices) = Session::open(user, &self.services);
                self.notices = Some(notices);
                self.session.insert(session).refresh().await.map(|_| ())
            }
            None => {
                if let Some(session) = self.session.take() {
                    info!(user = %session.user().id, "closing session");
                }
                self.notices = None;
                Ok(())
            }
        }
    }
}
