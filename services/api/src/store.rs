use crate::models::Chat;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory chat registry shared by the handlers.
#[derive(Default)]
pub struct ChatStore {
    chats: RwLock<HashMap<String, Chat>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All chats, newest first.
    pub async fn list(&self) -> Vec<Chat> {
        let mut chats: Vec<Chat> = self.chats.read().await.values().cloned().collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        chats
    }

    pub async fn get(&self, id: &str) -> Option<Chat> {
        self.chats.read().await.get(id).cloned()
    }

    /// Inserts or replaces the chat with the same id.
    pub async fn upsert(&self, chat: Chat) -> Chat {
        self.chats
            .write()
            .await
            .insert(chat.id.clone(), chat.clone());
        chat
    }

    pub async fn delete(&self, id: &str) -> Option<Chat> {
        self.chats.write().await.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatState;
    use chrono::{Duration, Utc};

    fn chat(id: &str, age_minutes: i64) -> Chat {
        Chat {
            id: id.to_string(),
            title: format!("Chat {id}"),
            describe: String::new(),
            created_at: Utc::now() - Duration::minutes(age_minutes),
            state: ChatState {
                model: "gemini".to_string(),
                voice: "Puck".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = ChatStore::new();
        store.upsert(chat("old", 30)).await;
        store.upsert(chat("new", 1)).await;
        store.upsert(chat("mid", 10)).await;

        let ids: Vec<String> = store.list().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let store = ChatStore::new();
        store.upsert(chat("a", 5)).await;
        let mut renamed = chat("a", 5);
        renamed.title = "Renamed".to_string();
        store.upsert(renamed).await;

        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.get("a").await.unwrap().title, "Renamed");

        assert!(store.delete("a").await.is_some());
        assert!(store.delete("a").await.is_none());
        assert!(store.get("a").await.is_none());
    }
}
