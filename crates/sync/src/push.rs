//! Push notification subscriptions.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared handle to the platform's push service.
pub type PushHandle = Arc<dyn PushService>;

/// Notification permission as the user last decided it.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not asked yet
    #[default]
    #[display("default")]
    Default,
    #[display("granted")]
    Granted,
    #[display("denied")]
    Denied,
}

/// An active push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time_ms: Option<i64>,
}

/// The platform's push capability.
#[async_trait]
pub trait PushService: Send + Sync {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> Permission;

    /// Prompt the user. Returns the decision.
    async fn request_permission(&self) -> Result<Permission>;

    async fn subscribe(&self, application_server_key: Option<&str>) -> Result<Subscription>;

    /// Returns `false` if there was no subscription.
    async fn unsubscribe(&self) -> Result<bool>;

    async fn subscription(&self) -> Result<Option<Subscription>>;
}

/// Subscribes the worker to push messages.
#[derive(Clone)]
pub struct PushManager {
    service: PushHandle,
    application_server_key: Option<String>,
}

impl PushManager {
    pub fn new(service: PushHandle, application_server_key: Option<String>) -> Self {
        Self { service, application_server_key }
    }

    pub fn is_supported(&self) -> bool {
        self.service.is_supported()
    }

    pub fn permission(&self) -> Permission {
        self.service.permission()
    }

    /// Subscribe, asking for permission first if the user hasn't decided.
    ///
    /// An existing subscription is returned as is.
    pub async fn subscribe(&self) -> Result<Subscription> {
        if !self.service.is_supported() {
            exn::bail!(ErrorKind::Unsupported);
        }
        let permission = match self.service.permission() {
            Permission::Default => self.service.request_permission().await?,
            decided => decided,
        };
        if permission != Permission::Granted {
            tracing::info!(%permission, "Push permission not granted");
            exn::bail!(ErrorKind::PermissionDenied);
        }
        if let Some(existing) = self.service.subscription().await? {
            return Ok(existing);
        }
        let subscription = self.service.subscribe(self.application_server_key.as_deref()).await?;
        tracing::info!(endpoint = %subscription.endpoint, "Subscribed to push");
        Ok(subscription)
    }

    pub async fn unsubscribe(&self) -> Result<bool> {
        if !self.service.is_supported() {
            return Ok(false);
        }
        self.service.unsubscribe().await
    }

    pub async fn subscription(&self) -> Result<Option<Subscription>> {
        if !self.service.is_supported() {
            return Ok(None);
        }
        self.service.subscription().await
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockPushService;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::sync::Mutex;

    /// In-memory push service.
    ///
    /// [`request_permission()`](PushService::request_permission) resolves to
    /// whatever was set with [`answer_prompt()`](Self::answer_prompt).
    pub struct MockPushService {
        supported: bool,
        state: Mutex<State>,
    }

    struct State {
        permission: Permission,
        prompt_answer: Permission,
        prompts: usize,
        subscription: Option<Subscription>,
        last_key: Option<String>,
    }

    impl Default for MockPushService {
        fn default() -> Self {
            Self {
                supported: true,
                state: Mutex::new(State {
                    permission: Permission::Default,
                    prompt_answer: Permission::Granted,
                    prompts: 0,
                    subscription: None,
                    last_key: None,
                }),
            }
        }
    }

    impl MockPushService {
        pub fn unsupported() -> Self {
            Self { supported: false, ..Self::default() }
        }

        fn state(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        pub fn answer_prompt(&self, answer: Permission) {
            self.state().prompt_answer = answer;
        }

        pub fn prompts(&self) -> usize {
            self.state().prompts
        }

        /// Application server key passed to the last subscribe.
        pub fn last_key(&self) -> Option<String> {
            self.state().last_key.clone()
        }
    }

    #[async_trait]
    impl PushService for MockPushService {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn permission(&self) -> Permission {
            self.state().permission
        }

        async fn request_permission(&self) -> Result<Permission> {
            let mut state = self.state();
            state.prompts += 1;
            let answer = state.prompt_answer;
            state.permission = answer;
            Ok(state.permission)
        }

        async fn subscribe(&self, application_server_key: Option<&str>) -> Result<Subscription> {
            let mut state = self.state();
            if state.permission != Permission::Granted {
                exn::bail!(ErrorKind::PermissionDenied);
            }
            state.last_key = application_server_key.map(String::from);
            let subscription = Subscription { endpoint: "https://push.example/sub/1".to_string(), expiration_time_ms: None };
            state.subscription = Some(subscription.clone());
            Ok(subscription)
        }

        async fn unsubscribe(&self) -> Result<bool> {
            Ok(self.state().subscription.take().is_some())
        }

        async fn subscription(&self) -> Result<Option<Subscription>> {
            Ok(self.state().subscription.clone())
        }
    }
}
