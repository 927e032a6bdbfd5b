//! 组件配置
//!
//! 聊天微服务地址、Socket 地址、组件密钥等，支持从环境变量加载

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// 默认聊天微服务地址
pub const DEFAULT_CHAT_MICROSERVICE_HOST: &str = "http://localhost:3501";

/// 组件配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// 聊天微服务地址
    #[serde(default = "default_host")]
    pub chat_microservice_host: String,
    /// Socket 服务地址（为空时使用微服务地址）
    #[serde(default)]
    pub socket_server_url: Option<String>,
    /// 组件 API 密钥
    #[serde(default)]
    pub widget_api_key: Option<String>,
    /// 普通请求超时（毫秒），不作用于流式响应
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// 历史消息分页大小
    #[serde(default = "default_history_page_limit")]
    pub history_page_limit: usize,
    /// 对方输入中提示的自动过期时间（毫秒）
    #[serde(default = "default_typing_indicator_timeout")]
    pub typing_indicator_timeout_ms: u64,
}

fn default_host() -> String {
    DEFAULT_CHAT_MICROSERVICE_HOST.to_string()
}
fn default_request_timeout() -> u64 {
    30000
}
fn default_history_page_limit() -> usize {
    20
}
fn default_typing_indicator_timeout() -> u64 {
    5000
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            chat_microservice_host: default_host(),
            socket_server_url: None,
            widget_api_key: None,
            request_timeout_ms: default_request_timeout(),
            history_page_limit: default_history_page_limit(),
            typing_indicator_timeout_ms: default_typing_indicator_timeout(),
        }
    }
}

impl WidgetConfig {
    /// 从环境变量加载
    ///
    /// - `CHAT_MICROSERVICE_HOST`
    /// - `SOCKET_SERVER_URL`
    /// - `WIDGET_API_KEY`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(host) = non_empty_env("CHAT_MICROSERVICE_HOST") {
            config.chat_microservice_host = host;
        }
        config.socket_server_url = non_empty_env("SOCKET_SERVER_URL");
        config.widget_api_key = non_empty_env("WIDGET_API_KEY");

        config
    }

    /// 设置组件密钥
    pub fn with_widget_api_key(mut self, key: impl Into<String>) -> Self {
        self.widget_api_key = Some(key.into());
        self
    }

    /// 校验配置
    pub fn validate(&self) -> ChatResult<()> {
        if self.chat_microservice_host.trim().is_empty() {
            return Err(ChatError::config("chatMicroserviceHost must not be empty"));
        }
        if self.history_page_limit == 0 {
            return Err(ChatError::config("historyPageLimit must be greater than 0"));
        }
        Ok(())
    }

    /// 去掉末尾斜杠的微服务地址
    pub fn host(&self) -> &str {
        self.chat_microservice_host.trim_end_matches('/')
    }

    /// Socket 地址，未配置时回退到微服务地址
    pub fn socket_url(&self) -> &str {
        self.socket_server_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.chat_microservice_host)
    }

    /// 组件密钥，空字符串视为未设置
    pub fn widget_key(&self) -> Option<&str> {
        self.widget_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
