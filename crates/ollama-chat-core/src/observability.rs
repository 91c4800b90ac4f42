use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool;

static INIT: OnceCell<()> = OnceCell::new();

fn observability_enabled(lookup: &impl Fn(&str) -> Option<String>) -> bool {
    lookup("OLLAMA_CHAT_OBSERVABILITY")
        .map(|value| parse_bool(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_filter_directive(lookup: &impl Fn(&str) -> Option<String>) -> String {
    ["OLLAMA_CHAT_LOG_LEVEL", "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|value| tracing_subscriber::EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| "warn".to_string())
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `OLLAMA_CHAT_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `OLLAMA_CHAT_LOG_LEVEL`: optional level/filter (`info`, `debug`, etc.).
/// - `RUST_LOG`: fallback filter. Without either, only warnings are shown.
/// - `OLLAMA_CHAT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr so they never mix with generated text on stdout.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let lookup = |key: &str| std::env::var(key).ok();
        if !observability_enabled(&lookup) {
            return;
        }

        let env_filter = tracing_subscriber::EnvFilter::new(resolve_filter_directive(&lookup));
        if let Some(path_raw) = lookup("OLLAMA_CHAT_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("ollama-chat.logs.jsonl");
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn filter_prefers_own_variable_then_rust_log() {
        assert_eq!(resolve_filter_directive(&env(&[])), "warn");
        assert_eq!(
            resolve_filter_directive(&env(&[("RUST_LOG", "info")])),
            "info"
        );
        assert_eq!(
            resolve_filter_directive(&env(&[
                ("RUST_LOG", "info"),
                ("OLLAMA_CHAT_LOG_LEVEL", "debug")
            ])),
            "debug"
        );
    }

    #[test]
    fn observability_flag_parsing() {
        assert!(observability_enabled(&env(&[])));
        assert!(!observability_enabled(&env(&[("OLLAMA_CHAT_OBSERVABILITY", "off")])));
        assert!(observability_enabled(&env(&[("OLLAMA_CHAT_OBSERVABILITY", "garbage")])));
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
