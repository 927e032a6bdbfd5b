//! Socket 生命周期管理
//!
//! 显式持有的连接管理器，替代全局单例：
//! - `init` 幂等，已初始化时返回现有连接
//! - `get` 未初始化时返回 [`ChatError::NotInitialized`]
//! - `teardown` 注销处理器、断开连接并清空，之后 `init` 会创建全新连接

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::connection::SocketConnection;
use super::handlers::{
    register_socket_event_handlers, HandlerRegistration, LoggingHandlers, SocketEventHandlers,
};
use super::types::{
    ConnectionOptions, ConnectionState, SocketClientConfig, SocketEndpoint, SOCKET_PATH_SUFFIX,
    WIDGET_KEY_AUTH_FIELD,
};
use crate::config::WidgetConfig;
use crate::error::{ChatError, ChatResult};

struct ActiveSocket {
    connection: Arc<SocketConnection>,
    registration: HandlerRegistration,
}

/// Socket 连接管理器
pub struct SocketManager {
    /// 默认连接地址
    default_url: String,
    /// 组件密钥，注入到 auth 中
    widget_key: Option<String>,
    handlers: RwLock<Arc<dyn SocketEventHandlers>>,
    active: Mutex<Option<ActiveSocket>>,
}

impl SocketManager {
    pub fn new(default_url: impl Into<String>, widget_key: Option<String>) -> Self {
        Self {
            default_url: default_url.into(),
            widget_key: widget_key.filter(|k| !k.trim().is_empty()),
            handlers: RwLock::new(Arc::new(LoggingHandlers)),
            active: Mutex::new(None),
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(config.socket_url(), config.widget_key().map(str::to_string))
    }

    /// 设置事件处理器，下一次 `init` 生效
    pub fn set_handlers(&self, handlers: Arc<dyn SocketEventHandlers>) {
        *self.handlers.write() = handlers;
    }

    /// 初始化连接（幂等）
    pub fn init(&self, config: SocketClientConfig) -> Arc<SocketConnection> {
        let mut active = self.active.lock();
        if let Some(existing) = active.as_ref() {
            debug!("Socket already initialized");
            return existing.connection.clone();
        }

        let endpoint = resolve_socket_endpoint(config.url.as_deref().unwrap_or(&self.default_url));
        let options = build_connection_options(&config.options, &endpoint, self.widget_key.as_deref());
        let auto_connect = config.auto_connect || options.auto_connect;

        let connection = Arc::new(SocketConnection::new(endpoint, options));
        let registration =
            register_socket_event_handlers(&connection, self.handlers.read().clone());

        if auto_connect {
            if let Err(e) = connection.connect() {
                error!("Socket auto-connect failed: {}", e);
            }
        }

        info!("Socket initialized for {}", connection.endpoint().url);
        *active = Some(ActiveSocket {
            connection: connection.clone(),
            registration,
        });
        connection
    }

    /// 获取当前连接
    pub fn get(&self) -> ChatResult<Arc<SocketConnection>> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.connection.clone())
            .ok_or(ChatError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.active.lock().is_some()
    }

    /// 当前连接状态，未初始化视为断开
    pub fn state(&self) -> ConnectionState {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.connection.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// 注销处理器、断开并清空
    pub fn teardown(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.registration.unregister();
        active.connection.disconnect();
        info!("Socket torn down");
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// 解析连接地址
///
/// 连接目标为 URL 的 origin，路径为非根 pathname（去掉末尾斜杠）拼接固定后缀；
/// 解析失败时回退到原始地址 + 后缀，只记录警告
pub fn resolve_socket_endpoint(raw: &str) -> SocketEndpoint {
    match url::Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => {
            let origin = parsed.origin().ascii_serialization();
            let base = parsed.path().trim_end_matches('/');
            SocketEndpoint {
                url: origin,
                path: format!("{}{}", base, SOCKET_PATH_SUFFIX),
            }
        }
        Ok(_) | Err(_) => {
            warn!("Failed to parse socket url '{}', using defaults", raw);
            SocketEndpoint {
                url: raw.to_string(),
                path: SOCKET_PATH_SUFFIX.to_string(),
            }
        }
    }
}

/// 合并默认选项、调用方选项与鉴权字段
///
/// 有密钥时写入固定字段并保留调用方的其他 auth 字段；没有密钥时不写该字段
pub fn build_connection_options(
    options: &ConnectionOptions,
    endpoint: &SocketEndpoint,
    widget_key: Option<&str>,
) -> ConnectionOptions {
    let mut merged = options.clone();
    if merged.path.is_none() {
        merged.path = Some(endpoint.path.clone());
    }

    match widget_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let mut auth = merged.auth.take().unwrap_or_default();
            auth.insert(WIDGET_KEY_AUTH_FIELD.to_string(), Value::String(key.to_string()));
            merged.auth = Some(auth);
        }
        None => {
            if let Some(auth) = merged.auth.as_mut() {
                auth.remove(WIDGET_KEY_AUTH_FIELD);
            }
        }
    }

    merged
}
