use crate::models::{Notice, NoticeLevel};
use chrono::Utc;
use tokio::sync::broadcast;

/// Fan-out of user-facing notices. Publishing never blocks and never fails;
/// a notice sent while nobody listens is dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Error, message);
    }

    pub fn publish(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        if self.sender.send(notice).is_err() {
            tracing::debug!(level = ?level, "notice dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Notifier;
    use crate::models::NoticeLevel;

    #[test]
    fn subscribers_receive_notices_in_order() {
        let notifier = Notifier::new(8);
        let mut receiver = notifier.subscribe();

        notifier.success("Company assigned successfully!");
        notifier.error("Please enter a comment");

        let first = receiver.try_recv().expect("first notice");
        assert_eq!(first.level, NoticeLevel::Success);
        assert_eq!(first.message, "Company assigned successfully!");
        let second = receiver.try_recv().expect("second notice");
        assert_eq!(second.level, NoticeLevel::Error);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let notifier = Notifier::default();
        notifier.info("nobody listening");
        let mut late = notifier.subscribe();
        assert!(late.try_recv().is_err());
    }
}
