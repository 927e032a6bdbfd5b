//! 认证重试
//!
//! 任意 API 调用遇到 401 时先刷新令牌，刷新成功则原样重试一次，
//! 否则把原始错误交给调用方

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::types::{RefreshTokenRequest, TOKEN_REFRESH_PATH, WIDGET_KEY_HEADER};
use crate::config::WidgetConfig;
use crate::error::{ChatError, ChatResult};
use crate::socket::{SocketClientConfig, SocketManager};

/// 令牌刷新提供者
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// 刷新令牌，成功返回 true
    async fn refresh_token(&self) -> bool;
}

/// 401 时刷新并重试一次
pub async fn with_auth_retry<T, F, Fut>(auth: Option<&dyn AuthProvider>, request: F) -> ChatResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ChatResult<T>>,
{
    let err = match request().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if !err.is_unauthorized() {
        return Err(err);
    }
    let Some(auth) = auth else {
        return Err(err);
    };

    debug!("Request unauthorized, refreshing token");
    if !auth.refresh_token().await {
        warn!("Token refresh failed, giving up");
        return Err(err);
    }

    request().await
}

/// 当前访客会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSession {
    pub customer_id: String,
    pub session_id: String,
}

struct SocketReinit {
    manager: Arc<SocketManager>,
    config: SocketClientConfig,
}

/// 基于刷新接口的令牌提供者
///
/// 与 [`ChatApiClient`](super::ChatApiClient) 共用同一个 `reqwest::Client`，
/// 刷新下发的 Cookie 会被后续请求带上
pub struct TokenAuthProvider {
    http: reqwest::Client,
    host: String,
    widget_key: Option<String>,
    session: RwLock<Option<CustomerSession>>,
    socket: Option<SocketReinit>,
}

impl TokenAuthProvider {
    pub fn new(http: reqwest::Client, config: &WidgetConfig) -> Self {
        Self {
            http,
            host: config.host().to_string(),
            widget_key: config.widget_key().map(str::to_string),
            session: RwLock::new(None),
            socket: None,
        }
    }

    /// 刷新成功后重新初始化 Socket
    pub fn with_socket_reinit(mut self, manager: Arc<SocketManager>, config: SocketClientConfig) -> Self {
        self.socket = Some(SocketReinit { manager, config });
        self
    }

    /// 设置访客会话
    pub fn set_session(&self, customer_id: impl Into<String>, session_id: impl Into<String>) {
        *self.session.write() = Some(CustomerSession {
            customer_id: customer_id.into(),
            session_id: session_id.into(),
        });
    }

    /// 清除访客会话
    pub fn clear_session(&self) {
        *self.session.write() = None;
    }

    pub fn session(&self) -> Option<CustomerSession> {
        self.session.read().clone()
    }

    async fn post_refresh(&self, session: &CustomerSession) -> ChatResult<()> {
        let url = format!("{}{}", self.host, TOKEN_REFRESH_PATH);
        let mut request = self.http.post(&url).json(&RefreshTokenRequest {
            customer_id: session.customer_id.clone(),
            session_id: session.session_id.clone(),
        });
        if let Some(key) = &self.widget_key {
            request = request.header(WIDGET_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::auth(format!(
                "Token refresh rejected (status {})",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for TokenAuthProvider {
    async fn refresh_token(&self) -> bool {
        let Some(session) = self.session() else {
            warn!("Cannot refresh token: customer session unknown");
            return false;
        };

        match self.post_refresh(&session).await {
            Ok(()) => {
                info!("Token refreshed");
                if let Some(socket) = &self.socket {
                    socket.manager.init(socket.config.clone());
                }
                true
            }
            Err(e) => {
                error!("Token refresh failed: {}", e);
                false
            }
        }
    }
}
