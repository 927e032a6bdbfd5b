//! History pagination
//!
//! `Replace` loads the newest page and swaps the transcript wholesale;
//! `Prepend` loads the page before the stored cursor and prepends only ids
//! that are not already present. Pages are sorted oldest first before they
//! reach the store; live messages are never re-sorted.

use tracing::{debug, error};

use super::state::ChatStore;
use crate::api::{MessagingApi, RetrieveLastMessagesParams};
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLoadResult {
    pub success: bool,
    pub has_more: bool,
}

impl HistoryLoadResult {
    fn failed() -> Self {
        Self {
            success: false,
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoadMode {
    Replace,
    Prepend,
}

/// Oldest first. Messages with an unparseable timestamp sort to the front;
/// ties keep their page order.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(Message::timestamp);
}

pub async fn retrieve_and_store_messages(
    api: &dyn MessagingApi,
    store: &ChatStore,
    mode: HistoryLoadMode,
    page_limit: usize,
) -> HistoryLoadResult {
    let cursor = match mode {
        HistoryLoadMode::Prepend => store.latest_chat_message_id(),
        HistoryLoadMode::Replace => None,
    };
    let params = RetrieveLastMessagesParams {
        limit: page_limit,
        latest_chat_message_id: cursor,
    };

    let response = match api.retrieve_last_messages(params).await {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to retrieve messages: {}", e);
            return HistoryLoadResult::failed();
        }
    };

    if response.data.is_empty() {
        debug!("History page empty ({:?})", mode);
        return HistoryLoadResult {
            success: true,
            has_more: false,
        };
    }

    let page_cursor = response.data.last().map(|record| record.id.clone());
    let mut page: Vec<Message> = response
        .data
        .into_iter()
        .map(|record| record.into_message())
        .collect();
    sort_chronologically(&mut page);
    let page_len = page.len();

    store.update(|state| {
        match mode {
            HistoryLoadMode::Replace => state.set_messages(page),
            HistoryLoadMode::Prepend => {
                state.prepend_messages(page);
            }
        }
        if let Some(id) = page_cursor.filter(|id| !id.is_empty()) {
            state.set_latest_chat_message_id(Some(id));
        }
    });

    let has_more = match mode {
        HistoryLoadMode::Replace => true,
        HistoryLoadMode::Prepend => page_len == page_limit,
    };
    debug!("Loaded {} history message(s), has_more={}", page_len, has_more);

    HistoryLoadResult {
        success: true,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{RetrieveLastMessagesResponse, SendMessageRequest};
    use crate::error::{ChatError, ChatResult};
    use crate::message::HistoryMessageRecord;
    use crate::streaming::StreamHandle;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct PagedApi {
        pages: Mutex<Vec<ChatResult<Vec<HistoryMessageRecord>>>>,
        seen: Mutex<Vec<RetrieveLastMessagesParams>>,
    }

    impl PagedApi {
        fn new(pages: Vec<ChatResult<Vec<HistoryMessageRecord>>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessagingApi for PagedApi {
        async fn open_stream(&self, _payload: SendMessageRequest) -> ChatResult<StreamHandle> {
            Err(ChatError::unknown("not used"))
        }

        async fn retrieve_last_messages(
            &self,
            params: RetrieveLastMessagesParams,
        ) -> ChatResult<RetrieveLastMessagesResponse> {
            self.seen.lock().push(params);
            let page = self.pages.lock().remove(0)?;
            Ok(RetrieveLastMessagesResponse {
                data: page,
                ..Default::default()
            })
        }
    }

    fn record(id: &str, minute: u32) -> HistoryMessageRecord {
        let sender = if minute % 2 == 0 { "Customer" } else { "Assistant" };
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "text": format!("message {}", id),
            "senderBy": sender,
            "createdAt": format!("2026-03-01T10:{:02}:00.000Z", minute),
        }))
        .unwrap()
    }

    fn ids(store: &ChatStore) -> Vec<String> {
        store.messages().iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_replace_sorts_and_sets_cursor() {
        let api = PagedApi::new(vec![Ok(vec![record("b", 2), record("a", 1), record("c", 3)])]);
        let store = ChatStore::new();
        store.append_message(Message::outgoing("stale"));

        let result = retrieve_and_store_messages(&api, &store, HistoryLoadMode::Replace, 20).await;

        assert_eq!(result, HistoryLoadResult { success: true, has_more: true });
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        // cursor comes from the last record of the raw page
        assert_eq!(store.latest_chat_message_id().as_deref(), Some("c"));
        assert!(store.messages()[1].from_me);
        assert!(api.seen.lock()[0].latest_chat_message_id.is_none());
    }

    #[tokio::test]
    async fn test_replace_with_empty_page_keeps_transcript() {
        let api = PagedApi::new(vec![Ok(vec![])]);
        let store = ChatStore::new();
        store.append_message(Message::outgoing("kept"));

        let result = retrieve_and_store_messages(&api, &store, HistoryLoadMode::Replace, 20).await;
        assert_eq!(result, HistoryLoadResult { success: true, has_more: false });
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_prepend_uses_cursor_and_page_size() {
        let full: Vec<_> = (0..20).map(|i| record(&format!("old-{}", i), i)).collect();
        let partial: Vec<_> = (0..15).map(|i| record(&format!("older-{}", i), i)).collect();
        let api = PagedApi::new(vec![Ok(full), Ok(partial)]);
        let store = ChatStore::new();
        store.set_latest_chat_message_id(Some("cursor-1".into()));

        let result = retrieve_and_store_messages(&api, &store, HistoryLoadMode::Prepend, 20).await;
        assert!(result.has_more);
        assert_eq!(api.seen.lock()[0].latest_chat_message_id.as_deref(), Some("cursor-1"));

        let result = retrieve_and_store_messages(&api, &store, HistoryLoadMode::Prepend, 20).await;
        assert!(!result.has_more);
        assert_eq!(store.messages().len(), 35);
        assert_eq!(store.messages()[0].id, "older-0");
    }

    #[tokio::test]
    async fn test_prepend_skips_duplicates() {
        let api = PagedApi::new(vec![Ok(vec![record("a", 1), record("b", 2)])]);
        let store = ChatStore::new();
        store.set_messages(vec![record("b", 2).into_message(), record("c", 3).into_message()]);

        retrieve_and_store_messages(&api, &store, HistoryLoadMode::Prepend, 20).await;
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_reports_unsuccessful() {
        let api = PagedApi::new(vec![Err(ChatError::network("down"))]);
        let store = ChatStore::new();

        let result = retrieve_and_store_messages(&api, &store, HistoryLoadMode::Replace, 20).await;
        assert_eq!(result, HistoryLoadResult { success: false, has_more: false });
    }

    #[test]
    fn test_unparseable_timestamp_sorts_first() {
        let mut good = record("good", 1).into_message();
        good.created_at = "2026-03-01T10:01:00.000Z".into();
        let mut bad = record("bad", 2).into_message();
        bad.created_at = "yesterday".into();

        let mut messages = vec![good, bad];
        sort_chronologically(&mut messages);
        assert_eq!(messages[0].id, "bad");
    }
}
