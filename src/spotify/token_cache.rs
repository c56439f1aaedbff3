use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Shared cache for the Spotify access token.
///
/// The lock only guards the stored value. Refreshing is left to callers and is
/// not serialized: two requests that both see an expired token will both
/// fetch a new one and the last `set` wins, which is harmless.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, unless it is missing or about to expire.
    pub fn get(&self) -> Option<String> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|token| Instant::now() + EXPIRY_MARGIN < token.expires_at)
            .map(|token| token.access_token.clone())
    }

    pub fn set(&self, access_token: String, expires_at: Instant) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(CachedToken {
            access_token,
            expires_at,
        });
    }

    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}
