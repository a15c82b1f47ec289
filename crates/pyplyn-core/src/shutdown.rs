//! Process-wide drain signal observed at stage boundaries.

use tokio_util::sync::CancellationToken;

/// Broadcast "draining" flag with a single monotonic transition.
///
/// Cloning shares the underlying state; once any clone initiates draining,
/// every observer sees it. In-flight pipeline runs consult this before each
/// stage and stop at the next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions to draining. Idempotent; there is no way back.
    pub fn initiate(&self) {
        self.token.cancel();
    }

    pub fn is_draining(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once draining begins; usable inside `tokio::select!`.
    pub async fn draining(&self) {
        self.token.cancelled().await;
    }
}
