use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::artifacts::{RELOAD_FILE, write_json};

/// Receiver of "safe to reload" signals. Signalling twice is harmless.
pub trait ReloadNotifier: Send + Sync + 'static {
    /// `source` names the pipeline that decided the reload.
    fn reload(&self, source: &str);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReloadStamp<'a> {
    source: &'a str,
    timestamp_ms: u64,
}

/// Signals a reload by rewriting `reload.json` in the artifacts directory; the
/// proxy layer watches that file and refreshes connected browsers.
pub struct TriggerFile {
    dir: PathBuf,
}

impl TriggerFile {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ReloadNotifier for TriggerFile {
    fn reload(&self, source: &str) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let stamp = ReloadStamp {
            source,
            timestamp_ms,
        };
        match write_json(&self.dir, RELOAD_FILE, &stamp) {
            Ok(_) => tracing::info!(source, "reload signalled"),
            Err(err) => tracing::warn!(source, error = %err, "failed to write reload trigger"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::ReloadNotifier;

    /// Records every signal, optionally into a shared event log.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub signals: Arc<Mutex<Vec<String>>>,
        pub log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl RecordingNotifier {
        pub fn with_log(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                signals: Arc::default(),
                log: Some(log),
            }
        }

        pub fn count(&self) -> usize {
            self.signals.lock().unwrap().len()
        }
    }

    impl ReloadNotifier for RecordingNotifier {
        fn reload(&self, source: &str) {
            self.signals.lock().unwrap().push(source.to_string());
            if let Some(log) = &self.log {
                log.lock().unwrap().push("reload".to_string());
            }
        }
    }
}
