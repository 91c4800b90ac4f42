use std::path::{Path, PathBuf};

/// Loads `.env` from the crate directory, then from the working directory.
///
/// Variables already set in the process environment win.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/.env")));
    dotenvy::dotenv().ok();
}

/// History file: `OLLAMA_CHAT_HISTORY_PATH`, else `~/.ollama-chat/chats.json`.
pub fn default_history_path() -> PathBuf {
    if let Ok(path) = std::env::var("OLLAMA_CHAT_HISTORY_PATH")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".ollama-chat").join("chats.json")
}
