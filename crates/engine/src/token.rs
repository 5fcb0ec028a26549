use futures_util::future::{BoxFuture, FutureExt, Shared};
use overlay_bridge_core::store::keys;
use overlay_bridge_core::{now_ms, CredentialPair, StoreError, TypedStore};
use overlay_bridge_providers::{ApiError, TokenEndpoint, TokenGrant};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("token endpoint rejected the refresh (http {status})")]
    Rejected { status: u16 },
    #[error("token refresh transport failure: {0}")]
    Transport(String),
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("credential store failure: {0}")]
    Store(String),
}

impl RefreshError {
    /// True when the user has to authorize again. A 5xx or a network failure
    /// is worth retrying on the next tick; a 4xx is not.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            RefreshError::MissingRefreshToken => true,
            RefreshError::Rejected { status } => (400..500).contains(status),
            RefreshError::Transport(_) | RefreshError::Malformed(_) | RefreshError::Store(_) => {
                false
            }
        }
    }
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(msg) => RefreshError::Transport(msg),
            ApiError::Malformed(msg) => RefreshError::Malformed(msg),
            other => RefreshError::Rejected {
                status: other.status().unwrap_or(400),
            },
        }
    }
}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        RefreshError::Store(err.to_string())
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// Owns the access/refresh token pair in the store.
///
/// Concurrent [`TokenManager::refresh`] calls are coalesced: every caller that
/// arrives while a refresh is in flight awaits the same request, so a
/// rotated refresh token is never spent twice.
pub struct TokenManager {
    store: TypedStore,
    endpoint: Arc<dyn TokenEndpoint>,
    inflight: Mutex<Option<SharedRefresh>>,
}

impl TokenManager {
    pub fn new(store: TypedStore, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            endpoint,
            inflight: Mutex::new(None),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        match self.store.get_string(keys::ACCESS_TOKEN) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read access token");
                None
            }
        }
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        let access_token = self.access_token()?;
        let refresh_token = self.store.get_string(keys::REFRESH_TOKEN).ok()??;
        let expires_at = self
            .store
            .get_string(keys::TOKEN_EXPIRES_AT)
            .ok()
            .flatten()
            .and_then(|v| v.trim().parse().ok());
        Some(CredentialPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let fut = {
            let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(fut) => fut.clone(),
                None => {
                    let fut = run_refresh(self.store.clone(), Arc::clone(&self.endpoint))
                        .boxed()
                        .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|cur| cur.ptr_eq(&fut)) {
            *slot = None;
        }
        result
    }

    /// Exchanges an authorization code through the proxy and stores the grant.
    pub async fn authorize(&self, code: &str) -> Result<CredentialPair, RefreshError> {
        let grant = self.endpoint.exchange(code).await?;
        if grant.refresh_token.is_none() {
            return Err(RefreshError::Malformed(
                "authorization grant without refresh_token".to_string(),
            ));
        }
        persist_grant(&self.store, &grant)?;
        info!("stored new authorization");
        self.credentials()
            .ok_or_else(|| RefreshError::Store("credentials missing after write".to_string()))
    }

    /// Removes credentials and everything derived from them.
    pub fn disconnect(&self) -> Result<(), StoreError> {
        for key in [
            keys::ACCESS_TOKEN,
            keys::REFRESH_TOKEN,
            keys::TOKEN_EXPIRES_AT,
            keys::NOW_PLAYING,
            keys::QUEUE,
        ] {
            self.store.remove(key)?;
        }
        info!("disconnected; credentials removed");
        Ok(())
    }
}

async fn run_refresh(
    store: TypedStore,
    endpoint: Arc<dyn TokenEndpoint>,
) -> Result<String, RefreshError> {
    let refresh_token = store
        .get_string(keys::REFRESH_TOKEN)?
        .ok_or(RefreshError::MissingRefreshToken)?;

    info!("refreshing access token");
    let grant = endpoint.refresh(&refresh_token).await?;
    persist_grant(&store, &grant)?;
    Ok(grant.access_token)
}

fn persist_grant(store: &TypedStore, grant: &TokenGrant) -> Result<(), StoreError> {
    if let Some(rotated) = grant.refresh_token.as_deref().filter(|t| !t.is_empty()) {
        store.set_string(keys::REFRESH_TOKEN, rotated)?;
    }
    match grant.expires_in {
        Some(secs) => store.set_string(
            keys::TOKEN_EXPIRES_AT,
            &(now_ms() + secs.saturating_mul(1_000)).to_string(),
        )?,
        None => store.remove(keys::TOKEN_EXPIRES_AT)?,
    }
    store.set_string(keys::ACCESS_TOKEN, &grant.access_token)
}
