use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use pt_core::{CoreError, CoreResult, IdentityProvider, User, UserId};

use crate::{read_yaml, run_blocking, write_yaml};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize, Serialize)]
struct UserRecord {
    id: UserId,
    email: String,
    salt: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn new(email: String, password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&salt, password);
        Self {
            id: UserId::new(Uuid::new_v4().to_string()),
            email,
            salt,
            password_hash,
            created_at: Utc::now(),
        }
    }

    fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }

    fn user(&self) -> User {
        User {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SessionFile {
    user: Option<User>,
}

/// Local identity provider backed by YAML files in the state directory.
///
/// The signed-in user survives process restarts and every change is
/// broadcast to [`IdentityProvider::subscribe`] receivers.
#[derive(Debug)]
pub struct FsIdentity {
    state_root: PathBuf,
    current: watch::Sender<Option<User>>,
}

impl FsIdentity {
    /// Open the provider, restoring a persisted sign-in if one exists.
    pub fn open(state_root: PathBuf) -> CoreResult<Self> {
        let session = read_yaml::<SessionFile>(&session_path(&state_root))?.unwrap_or_default();
        let (current, _) = watch::channel(session.user);
        Ok(Self {
            state_root,
            current,
        })
    }

    fn users_path(&self) -> PathBuf {
        self.state_root.join("users.yaml")
    }

    async fn set_current(&self, user: Option<User>) -> CoreResult<()> {
        let path = session_path(&self.state_root);
        let session = SessionFile { user: user.clone() };
        run_blocking(move || write_yaml(&path, &session)).await?;
        self.current.send_replace(user);
        Ok(())
    }
}

fn session_path(state_root: &Path) -> PathBuf {
    state_root.join("session.yaml")
}

fn hash_password(salt: &str, password: &str) -> String {
    pt_utils::sha256_hex(format!("{salt}{password}"))
}

fn normalize_email(email: &str) -> CoreResult<String> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(CoreError::Auth("invalid email address".into()));
    }
    Ok(email)
}

fn load_users(path: &Path) -> CoreResult<Vec<UserRecord>> {
    Ok(read_yaml(path)?.unwrap_or_default())
}

#[async_trait]
impl IdentityProvider for FsIdentity {
    async fn register(&self, email: &str, password: &str) -> CoreResult<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CoreError::Auth(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let path = self.users_path();
        let password = password.to_string();
        let user = run_blocking(move || {
            let mut users = load_users(&path)?;
            if users.iter().any(|record| record.email == email) {
                return Err(CoreError::Auth("email already in use".into()));
            }
            let record = UserRecord::new(email, &password);
            let user = record.user();
            users.push(record);
            write_yaml(&path, &users)?;
            Ok(user)
        })
        .await?;

        info!(user = %user.id, "registered user");
        self.set_current(Some(user.clone())).await?;
        Ok(user)
    }

    async fn login(&self, email: &str, password: &str) -> CoreResult<User> {
        let email = normalize_email(email)?;
        let path = self.users_path();
        let password = password.to_string();
        let user = run_blocking(move || {
            load_users(&path)?
                .iter()
                .find(|record| record.email == email && record.verify(&password))
                .map(UserRecord::user)
                .ok_or_else(|| CoreError::Auth("invalid email or password".into()))
        })
        .await?;

        info!(user = %user.id, "signed in");
        self.set_current(Some(user.clone())).await?;
        Ok(user)
    }

    async fn logout(&self) -> CoreResult<()> {
        if self.current.borrow().is_some() {
            info!("signed out");
        }
        self.set_current(None).await
    }

    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}
