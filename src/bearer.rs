use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::config::AuthConfig;

/// Explicit cache state for the file-backed token: the last value read and
/// the mtime it was read at. Never cleared once populated; a later empty or
/// failed read keeps the previous value.
#[derive(Debug, Default)]
pub struct FileTokenCache {
    value: Option<String>,
    source_mtime: Option<SystemTime>,
}

impl FileTokenCache {
    /// Refresh the cache against the file's observed `mtime`, invoking `read`
    /// only when the mtime changed or no value is cached yet.
    pub fn refresh<F>(&mut self, mtime: SystemTime, read: F) -> Option<&str>
    where
        F: FnOnce() -> io::Result<String>,
    {
        if self.source_mtime == Some(mtime) && self.value.is_some() {
            return self.value.as_deref();
        }
        match read() {
            Ok(raw) => {
                self.source_mtime = Some(mtime);
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    self.value = Some(trimmed.to_string());
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read token file");
            }
        }
        self.value.as_deref()
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Resolves the Authorization header value for upstream calls.
///
/// Priority: static config token, then the token file (mtime-cached,
/// process-wide). A missing file means "no token yet", not an error.
pub struct BearerResolver {
    static_token: String,
    token_file: Option<PathBuf>,
    cache: Mutex<FileTokenCache>,
    file_ready: AtomicBool,
}

impl BearerResolver {
    #[must_use]
    pub fn new(auth: &AuthConfig) -> Self {
        let token_file = if auth.token_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&auth.token_file))
        };
        Self {
            static_token: auth.static_token.trim().to_string(),
            file_ready: AtomicBool::new(token_file.is_none()),
            token_file,
            cache: Mutex::new(FileTokenCache::default()),
        }
    }

    /// Resolve the upstream Authorization header value, normalized to carry
    /// the `Bearer ` prefix. Returns `None` when no token is available yet.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        if !self.static_token.is_empty() {
            return Some(normalize_bearer(&self.static_token));
        }
        self.refresh_from_file().map(|raw| normalize_bearer(&raw))
    }

    fn refresh_from_file(&self) -> Option<String> {
        let path = self.token_file.as_ref()?;
        let mut cache = self.cache.lock();
        match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(mtime) => {
                let path = path.clone();
                let value = cache
                    .refresh(mtime, move || std::fs::read_to_string(path))
                    .map(ToString::to_string);
                if value.is_some() {
                    self.file_ready.store(true, Ordering::Relaxed);
                }
                value
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(error = %err, path = %path.display(), "failed to stat token file");
                }
                cache.value().map(ToString::to_string)
            }
        }
    }

    /// Poll the token file until it yields a token or the wall-clock budget
    /// runs out. Used once at process boot; exhausting the budget degrades to
    /// unauthenticated upstream calls instead of blocking forever.
    pub async fn wait_for_token(&self, poll_interval: Duration, max_wait: Duration) -> bool {
        let Some(path) = self.token_file.clone() else {
            tracing::info!("no token file configured, proceeding without token");
            return true;
        };

        tracing::info!(path = %path.display(), "waiting for token file");
        let start = tokio::time::Instant::now();
        while start.elapsed() < max_wait {
            if let Some(token) = self.refresh_from_file() {
                tracing::info!(chars = token.len(), "token file ready");
                return true;
            }
            tracing::info!(
                elapsed_secs = start.elapsed().as_secs(),
                "token file not ready, waiting"
            );
            tokio::time::sleep(poll_interval).await;
        }

        tracing::warn!(
            max_wait_ms = max_wait.as_millis() as u64,
            "token file not found within budget, proceeding without token"
        );
        self.file_ready.store(true, Ordering::Relaxed);
        false
    }

    /// Whether the startup token requirement has been satisfied or waived.
    #[must_use]
    pub fn token_ready(&self) -> bool {
        self.file_ready.load(Ordering::Relaxed)
    }

    /// Whether any token is currently held (static or cached from file).
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.static_token.is_empty() || self.cache.lock().value().is_some()
    }
}

/// Normalize a raw token into a full Authorization header value.
#[must_use]
pub fn normalize_bearer(raw: &str) -> String {
    if raw.starts_with("Bearer ") {
        raw.to_string()
    } else {
        format!("Bearer {raw}")
    }
}
