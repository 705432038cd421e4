use tokio::sync::Mutex;

/// A per-cluster monotonically advancing resource-version watermark, shared
/// between the initial list and every subsequent watch attempt so a
/// reconnect resumes from where the stream left off.
///
/// Guarded by an async mutex even though today's engine only ever touches
/// it from the single engine thread — documenting the invariant now means
/// a future multi-threaded scheduler doesn't silently lose it.
pub struct ResourceVersionCursor {
    current: Mutex<u64>,
}

impl Default for ResourceVersionCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceVersionCursor {
    pub fn new() -> Self {
        Self { current: Mutex::new(0) }
    }

    pub async fn get(&self) -> u64 {
        *self.current.lock().await
    }

    /// Raises the cursor to `max(current, version)`. Idempotent for
    /// `version <= current`.
    pub async fn observe(&self, version: u64) {
        let mut guard = self.current.lock().await;
        if version > *guard {
            *guard = version;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_only_raises() {
        let cursor = ResourceVersionCursor::new();
        assert_eq!(cursor.get().await, 0);

        cursor.observe(10).await;
        assert_eq!(cursor.get().await, 10);

        cursor.observe(5).await; // idempotent: never lowers
        assert_eq!(cursor.get().await, 10);

        cursor.observe(20).await;
        assert_eq!(cursor.get().await, 20);
    }
}
