//! Cycling-dot animation for status messages.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Edit cadence. Clients animate by editing the same message in place.
const FRAME_INTERVAL: Duration = Duration::from_millis(1500);

/// Detect the status-message pattern `*<text>...*\n\n`.
#[must_use]
pub fn is_status_message(content: &str) -> bool {
    content.starts_with('*') && content.ends_with("*\n\n") && content.contains("...")
}

/// Target a channel animation edits: typically a frontend message handle.
#[async_trait]
pub trait AnimationTarget: Send + Sync {
    /// Replace the message content. Return `false` to stop the animation
    /// (message deleted, thread archived).
    async fn edit(&self, content: &str) -> bool;
}

/// Per-channel animation tasks cycling `.` → `..` → `...`.
#[derive(Default)]
pub struct StatusAnimator {
    tasks: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl StatusAnimator {
    /// Create an animator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start animating `base_text` in a channel, cancelling any animation
    /// already running there.
    pub fn start(&self, channel_id: &str, target: Arc<dyn AnimationTarget>, base_text: &str) {
        self.cancel(channel_id);
        let base_text = base_text.to_string();
        let handle = tokio::spawn(async move {
            let mut dots: usize = 1;
            loop {
                let content = format!("*{base_text}{}*", ".".repeat(dots));
                if !target.edit(&content).await {
                    break;
                }
                dots = if dots >= 3 { 1 } else { dots + 1 };
                tokio::time::sleep(FRAME_INTERVAL).await;
            }
        });
        if let Some(previous) = self.tasks.insert(channel_id.to_string(), handle) {
            previous.abort();
        }
        debug!(channel_id, "animation started");
    }

    /// Cancel a channel's animation. Safe when none exists.
    pub fn cancel(&self, channel_id: &str) {
        if let Some((_, handle)) = self.tasks.remove(channel_id) {
            handle.abort();
            debug!(channel_id, "animation cancelled");
        }
    }

    /// Cancel and restart when a new status message replaces the old one
    /// (`*Thinking...*` → `*Retrying...*`), or just cancel when real content
    /// begins streaming.
    pub fn on_content(
        &self,
        channel_id: &str,
        content: &str,
        target: Option<Arc<dyn AnimationTarget>>,
    ) {
        if is_status_message(content) {
            self.cancel(channel_id);
            if let Some(target) = target {
                let base = content.trim().trim_matches('*').trim_end_matches('.');
                self.start(channel_id, target, base);
            }
        } else {
            self.cancel(channel_id);
        }
    }

    /// Number of running animations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for StatusAnimator {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Frames {
        frames: Mutex<Vec<String>>,
    }

    impl Frames {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnimationTarget for Frames {
        async fn edit(&self, content: &str) -> bool {
            self.frames.lock().unwrap().push(content.to_string());
            true
        }
    }

    #[test]
    fn test_is_status_message() {
        assert!(is_status_message("*Thinking...*\n\n"));
        assert!(is_status_message("*Retrying with non-streaming mode...*\n\n"));
        assert!(!is_status_message("Thinking..."));
        assert!(!is_status_message("*bold text*\n\n"));
        assert!(!is_status_message("*Thinking...*"));
    }

    #[tokio::test]
    async fn test_animation_cycles_dots() {
        let animator = StatusAnimator::new();
        let frames = Frames::new();
        animator.start("chan", Arc::clone(&frames) as _, "Thinking");

        // First frame is written immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        animator.cancel("chan");

        let recorded = frames.frames.lock().unwrap().clone();
        assert_eq!(recorded.first().map(String::as_str), Some("*Thinking.*"));
    }

    #[tokio::test]
    async fn test_start_replaces_existing() {
        let animator = StatusAnimator::new();
        let frames = Frames::new();
        animator.start("chan", Arc::clone(&frames) as _, "Thinking");
        animator.start("chan", Arc::clone(&frames) as _, "Retrying");
        assert_eq!(animator.active_count(), 1);
        animator.cancel("chan");
        assert_eq!(animator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_on_content_cancels_for_real_content() {
        let animator = StatusAnimator::new();
        let frames = Frames::new();
        animator.start("chan", Arc::clone(&frames) as _, "Thinking");
        animator.on_content("chan", "Here is your answer", None);
        assert_eq!(animator.active_count(), 0);
    }
}
