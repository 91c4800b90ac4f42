use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::conversation::Chat;
use crate::errors::ChatError;

/// Persistence for chat history.
pub trait ChatStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<Chat>, ChatError>;

    /// Inserts or replaces the chat with the same id.
    fn save(&self, chat: &Chat) -> Result<(), ChatError>;

    /// Returns whether a chat was removed.
    fn delete(&self, id: &str) -> Result<bool, ChatError>;

    /// All chats, newest first.
    fn list(&self) -> Result<Vec<Chat>, ChatError>;

    fn clear(&self) -> Result<(), ChatError>;
}

fn newest_first(mut chats: Vec<Chat>) -> Vec<Chat> {
    chats.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
    chats
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryChatStore {
    chats: DashMap<String, Chat>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for MemoryChatStore {
    fn load(&self, id: &str) -> Result<Option<Chat>, ChatError> {
        Ok(self.chats.get(id).map(|entry| entry.value().clone()))
    }

    fn save(&self, chat: &Chat) -> Result<(), ChatError> {
        self.chats.insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, ChatError> {
        Ok(self.chats.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<Chat>, ChatError> {
        Ok(newest_first(
            self.chats.iter().map(|e| e.value().clone()).collect(),
        ))
    }

    fn clear(&self) -> Result<(), ChatError> {
        self.chats.clear();
        Ok(())
    }
}

/// Single JSON document mapping chat id to chat.
///
/// Every write replaces the file through a temporary sibling and a rename.
pub struct JsonFileChatStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileChatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Chat>, ChatError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "chat history is corrupt");
            ChatError::Store(format!("invalid chat history {}: {e}", self.path.display()))
        })
    }

    fn write_all(&self, chats: &BTreeMap<String, Chat>) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| store_error("create", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(chats)
            .map_err(|e| ChatError::Store(format!("failed to encode chat history: {e}")))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| store_error("write", &tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| store_error("rename", &self.path, e))?;
        debug!(path = %self.path.display(), chats = chats.len(), "chat history written");
        Ok(())
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Chat>) -> T,
    ) -> Result<T, ChatError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ChatError::Store("chat history lock poisoned".into()))?;
        let mut chats = self.read_all()?;
        let out = f(&mut chats);
        self.write_all(&chats)?;
        Ok(out)
    }
}

fn store_error(action: &str, path: &Path, err: std::io::Error) -> ChatError {
    error!(path = %path.display(), error = %err, action, "chat history io failed");
    ChatError::Store(format!("failed to {action} {}: {err}", path.display()))
}

impl ChatStore for JsonFileChatStore {
    fn load(&self, id: &str) -> Result<Option<Chat>, ChatError> {
        Ok(self.read_all()?.remove(id))
    }

    fn save(&self, chat: &Chat) -> Result<(), ChatError> {
        self.update(|chats| {
            chats.insert(chat.id.clone(), chat.clone());
        })
    }

    fn delete(&self, id: &str) -> Result<bool, ChatError> {
        self.update(|chats| chats.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<Chat>, ChatError> {
        Ok(newest_first(self.read_all()?.into_values().collect()))
    }

    fn clear(&self) -> Result<(), ChatError> {
        self.update(|chats| chats.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;

    fn chat(created: i64, first: &str) -> Chat {
        let mut conv = Conversation::new("llama3.2");
        conv.add_user(first);
        let mut chat = conv.into_chat();
        chat.created = created;
        chat
    }

    fn exercise(store: &dyn ChatStore) {
        let old = chat(1_000, "older");
        let new = chat(2_000, "newer");
        store.save(&old).expect("save");
        store.save(&new).expect("save");

        let titles: Vec<_> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["newer", "older"]);

        let mut edited = old.clone();
        edited.title = "renamed".into();
        store.save(&edited).expect("overwrite");
        assert_eq!(store.load(&old.id).expect("load"), Some(edited));
        assert_eq!(store.list().expect("list").len(), 2);

        assert!(store.delete(&new.id).expect("delete"));
        assert!(!store.delete(&new.id).expect("delete again"));
        assert_eq!(store.load(&new.id).expect("load"), None);

        store.clear().expect("clear");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn memory_store_behaves() {
        exercise(&MemoryChatStore::new());
    }

    #[test]
    fn json_store_behaves_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("chats.json");
        exercise(&JsonFileChatStore::new(&path));

        let kept = chat(5, "kept");
        JsonFileChatStore::new(&path).save(&kept).expect("save");
        let reopened = JsonFileChatStore::new(&path);
        assert_eq!(reopened.load(&kept.id).expect("load"), Some(kept));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileChatStore::new(dir.path().join("none.json"));
        assert!(store.list().expect("list").is_empty());
        assert_eq!(store.load("chat_x").expect("load"), None);
    }

    #[test]
    fn json_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chats.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = JsonFileChatStore::new(&path).list().expect_err("corrupt");
        assert!(matches!(err, ChatError::Store(_)));
    }
}
