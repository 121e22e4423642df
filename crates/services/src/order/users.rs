use std::collections::HashSet;

use async_trait::async_trait;

/// Answers whether a user may place orders.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, uid: i64) -> barrier::Result<bool>;
}

/// Accepts every positive user id.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllUsers;

#[async_trait]
impl UserDirectory for AllowAllUsers {
    async fn exists(&self, uid: i64) -> barrier::Result<bool> {
        Ok(uid > 0)
    }
}

/// A fixed set of users.
#[derive(Debug, Clone, Default)]
pub struct KnownUsers {
    users: HashSet<i64>,
}

impl KnownUsers {
    pub fn new(users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for KnownUsers {
    async fn exists(&self, uid: i64) -> barrier::Result<bool> {
        Ok(self.users.contains(&uid))
    }
}
