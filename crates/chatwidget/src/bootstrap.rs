//! Service wiring
//!
//! Builds the collaborators of one widget instance from a [`WidgetConfig`]:
//! a shared HTTP client (one cookie jar for API calls and token refresh), the
//! auth provider, the socket manager with the widget's handlers, and the
//! widget itself. Nothing here is global; two instances never share state.

use std::sync::Arc;

use tracing::info;

use crate::api::{ChatApiClient, TokenAuthProvider};
use crate::config::WidgetConfig;
use crate::error::{ChatError, ChatResult};
use crate::socket::{SocketClientConfig, SocketConnection, SocketManager};
use crate::widget::{ChatWidget, WidgetSocketHandlers};

pub struct WidgetServices {
    config: WidgetConfig,
    api: Arc<ChatApiClient>,
    auth: Arc<TokenAuthProvider>,
    socket: Arc<SocketManager>,
    widget: ChatWidget,
}

impl WidgetServices {
    pub fn new(config: WidgetConfig) -> ChatResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ChatError::network_with_source("Failed to build HTTP client", e))?;

        let socket = Arc::new(SocketManager::from_config(&config));
        let auth = Arc::new(
            TokenAuthProvider::new(http.clone(), &config)
                .with_socket_reinit(socket.clone(), SocketClientConfig::default()),
        );
        let api = Arc::new(
            ChatApiClient::with_http_client(http, &config).with_auth_provider(auth.clone()),
        );

        let widget = ChatWidget::new(api.clone(), &config);
        socket.set_handlers(Arc::new(WidgetSocketHandlers::new(&widget)));

        info!("Chat widget services ready for {}", config.host());
        Ok(Self {
            config,
            api,
            auth,
            socket,
            widget,
        })
    }

    pub fn from_env() -> ChatResult<Self> {
        Self::new(WidgetConfig::from_env())
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<ChatApiClient> {
        &self.api
    }

    pub fn auth(&self) -> &Arc<TokenAuthProvider> {
        &self.auth
    }

    pub fn socket(&self) -> &Arc<SocketManager> {
        &self.socket
    }

    pub fn widget(&self) -> &ChatWidget {
        &self.widget
    }

    /// Initialize and connect the socket.
    pub fn connect_socket(&self) -> Arc<SocketConnection> {
        self.socket.init(SocketClientConfig::auto_connect())
    }

    /// Cancel any in-flight turn and tear the socket down.
    pub fn shutdown(&self) {
        self.widget.close();
        self.socket.teardown();
    }
}

impl Drop for WidgetServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        let config = WidgetConfig {
            history_page_limit: 0,
            ..WidgetConfig::default()
        };
        assert!(matches!(WidgetServices::new(config), Err(ChatError::Config { .. })));
    }

    #[tokio::test]
    async fn test_wires_independent_instances() {
        let first = WidgetServices::new(WidgetConfig::default()).unwrap();
        let second = WidgetServices::new(WidgetConfig::default()).unwrap();

        first.socket().init(SocketClientConfig::default());
        assert!(first.socket().is_initialized());
        assert!(!second.socket().is_initialized());

        first.shutdown();
        assert!(!first.socket().is_initialized());
    }

    #[tokio::test]
    async fn test_drop_releases_the_service_graph() {
        let services = WidgetServices::new(WidgetConfig::default()).unwrap();
        services.socket().init(SocketClientConfig::default());

        let manager = Arc::downgrade(services.socket());
        let auth = Arc::downgrade(services.auth());
        let widget = services.widget().downgrade();
        drop(services);

        assert!(manager.upgrade().is_none());
        assert!(auth.upgrade().is_none());
        assert!(widget.upgrade().is_none());
    }
}
