//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::accounts::AccountCache;
use crate::services::auth::TokenKeys;
use crate::services::catalog::CategoryCache;
use crate::services::chat::ChatHub;
use crate::services::push::{PushError, PushSender};
use crate::services::uploads::ImageStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// process-wide resources such as the database pool, token keys, caches,
/// the chat hub, the push sender and the image store.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenKeys,
    accounts: AccountCache,
    chat: ChatHub,
    push: PushSender,
    categories: CategoryCache,
    images: ImageStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns `PushError::InvalidKey` if the configured VAPID key is unusable.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, PushError> {
        let push = PushSender::new(config.push.as_ref())?;
        Ok(Self::with_push(config, pool, push))
    }

    /// Create state with an explicit push sender.
    #[must_use]
    pub fn with_push(config: ApiConfig, pool: PgPool, push: PushSender) -> Self {
        let tokens = TokenKeys::new(&config.jwt_secret, config.token_ttl_hours);
        let images = ImageStore::new(&config.uploads);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                accounts: AccountCache::default(),
                chat: ChatHub::new(),
                push,
                categories: CategoryCache::default(),
                images,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Access token signing keys.
    #[must_use]
    pub fn tokens(&self) -> &TokenKeys {
        &self.inner.tokens
    }

    /// Cached account roles.
    #[must_use]
    pub fn accounts(&self) -> &AccountCache {
        &self.inner.accounts
    }

    /// Chat broadcast hub.
    #[must_use]
    pub fn chat(&self) -> &ChatHub {
        &self.inner.chat
    }

    /// Web Push sender.
    #[must_use]
    pub fn push(&self) -> &PushSender {
        &self.inner.push
    }

    /// Cached category list.
    #[must_use]
    pub fn categories(&self) -> &CategoryCache {
        &self.inner.categories
    }

    /// Uploaded image storage.
    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.inner.images
    }
}
