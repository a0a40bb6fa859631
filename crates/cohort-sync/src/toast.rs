use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

/// A short user-visible notice raised by a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

/// Handle managers use to surface failures to the presentation layer.
///
/// Passed in through `SyncContext`; whoever holds the receiver decides how
/// to render. Toasts raised after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ToastDispatcher {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ToastDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A dispatcher nobody listens to.
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(ToastLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(ToastLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(ToastLevel::Error, message.into());
    }

    fn push(&self, level: ToastLevel, message: String) {
        if self.tx.send(Toast { level, message }).is_err() {
            debug!("Toast dropped, no listener");
        }
    }
}
