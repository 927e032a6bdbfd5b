//! 对方输入中提示
//!
//! 全局只有一个计时器：新的 active 信号总是重置它，
//! inactive 信号取消它并移除提示消息，到期时若提示仍在则移除

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::state::{ChatState, ChatStore};
use crate::message::{Message, SENDER_ASSISTANT};
use crate::socket::TypingEventPayload;

/// 只接受该来源的 typing 事件
pub const AGENT_TYPING_SOURCE: &str = "agent";

/// 单一的自动过期计时器
pub struct TypingIndicatorTimer {
    duration: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TypingIndicatorTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            pending: Mutex::new(None),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// (重新)启动计时器，取代之前未到期的计时
    pub fn restart(&self, on_expire: impl FnOnce() + Send + 'static) {
        let duration = self.duration;
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_expire();
        }));
    }

    /// 取消计时，返回是否存在未到期的计时
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TypingIndicatorTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

/// 移除所有对方的输入中提示
pub fn remove_peer_typing_indicators(state: &mut ChatState) -> bool {
    if state.peer_typing_indicator().is_none() {
        return false;
    }
    let remaining: Vec<Message> = state
        .messages
        .iter()
        .filter(|m| !m.is_peer_typing_indicator())
        .cloned()
        .collect();
    state.set_messages(remaining);
    true
}

/// 处理 typing 事件
pub fn handle_peer_typing(store: &ChatStore, timer: &TypingIndicatorTimer, payload: &TypingEventPayload) {
    if payload.source.as_deref() != Some(AGENT_TYPING_SOURCE) {
        debug!("Ignoring typing event from {:?}", payload.source);
        return;
    }

    if payload.is_typing {
        store.update(|state| {
            if state.peer_typing_indicator().is_none() {
                state.append_message(Message::typing_indicator(SENDER_ASSISTANT));
            }
        });

        let store = store.clone();
        timer.restart(move || {
            if store.update(remove_peer_typing_indicators) {
                debug!("Typing indicator expired");
            }
        });
    } else {
        timer.cancel();
        store.update(remove_peer_typing_indicators);
    }
}
