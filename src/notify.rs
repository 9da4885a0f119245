//! Toast notifications: one at a time, spaced out, adjacent duplicates
//! dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    Default,
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub category: Category,
}

/// Where toasts end up.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification);

    fn dismiss(&self, _notification: &Notification) {}
}

/// Handle to the dispatcher task. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    min_spacing: Duration,
    display: Duration,
    exit: Duration,
}

impl NotificationQueue {
    /// Start the dispatcher. It ends once every handle is dropped and the
    /// queue has drained.
    pub fn spawn(config: &NotificationConfig, sink: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timing = Timing {
            min_spacing: Duration::from_millis(config.min_spacing_ms),
            display: Duration::from_millis(config.display_ms),
            exit: Duration::from_millis(config.exit_ms),
        };
        let handle = tokio::spawn(dispatch(rx, sink, timing));
        (Self { tx }, handle)
    }

    pub fn push(&self, message: impl Into<String>, category: Category) {
        let notification = Notification {
            message: message.into(),
            category,
        };
        if self.tx.send(notification).is_err() {
            debug!("Notification dispatcher stopped, dropping message");
        }
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.push(message, Category::Default);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message, Category::Info);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message, Category::Success);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(message, Category::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(message, Category::Error);
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    timing: Timing,
) {
    let mut last_shown: Option<Instant> = None;
    let mut last_message: Option<String> = None;

    while let Some(notification) = rx.recv().await {
        if let Some(shown_at) = last_shown {
            let elapsed = shown_at.elapsed();
            if elapsed < timing.min_spacing {
                sleep(timing.min_spacing - elapsed).await;
            }
        }

        if last_message.as_deref() == Some(notification.message.as_str()) {
            debug!(message = %notification.message, "Skipping repeated notification");
            continue;
        }

        sink.show(&notification);
        last_shown = Some(Instant::now());
        last_message = Some(notification.message.clone());

        sleep(timing.display + timing.exit).await;
        sink.dismiss(&notification);
    }
}
