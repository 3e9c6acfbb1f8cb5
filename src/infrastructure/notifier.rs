use crate::infrastructure::error::InfraError;

pub const NOTIFICATION_ICON: &str = "green_square_128px.png";
pub const NOTIFICATION_TITLE: &str = "Knob_joiner Error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub icon: String,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn for_failure(context: &str) -> Self {
        Self {
            icon: NOTIFICATION_ICON.to_string(),
            title: NOTIFICATION_TITLE.to_string(),
            message: format!(
                "An error occurred while {context}. Please check the log for details."
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), InfraError> {
        tracing::error!(
            target: "knob_joiner::notification",
            icon = %notification.icon,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}
