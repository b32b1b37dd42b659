use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::user::{ContactDetails, UserAccount};

use crate::services::store::StoreResult;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<UserAccount>>;

    async fn update_contact_details(
        &self,
        user_id: Uuid,
        details: &ContactDetails,
    ) -> StoreResult<()>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserAccount>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: UserAccount) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<UserAccount>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn update_contact_details(
        &self,
        user_id: Uuid,
        details: &ContactDetails,
    ) -> StoreResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            details.apply_to(user);
            debug!("Updated contact details for user {}", user_id);
        }
        Ok(())
    }
}
