use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::{Notification, Notifier};
use std::sync::Arc;

pub struct ErrorReporter<N>
where
    N: Notifier,
{
    notifier: Arc<N>,
}

impl<N> ErrorReporter<N>
where
    N: Notifier,
{
    pub fn new(notifier: Arc<N>) -> Self {
        Self { notifier }
    }

    pub fn report(&self, context: &str, error: &InfraError) -> Notification {
        tracing::error!(context, error = %error, details = ?error, "Error in {context}");
        let notification = Notification::for_failure(context);
        if let Err(notify_error) = self.notifier.notify(&notification) {
            tracing::warn!(error = %notify_error, "failed to deliver error notification");
        }
        notification
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::error::FetchError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent: Mutex<Vec<Notification>>,
        pub(crate) fail: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn messages(&self) -> Vec<String> {
            self.sent
                .lock()
                .expect("notifier lock poisoned")
                .iter()
                .map(|notification| notification.message.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<(), InfraError> {
            self.sent
                .lock()
                .expect("notifier lock poisoned")
                .push(notification.clone());
            if self.fail {
                return Err(InfraError::Io(std::io::Error::other("display unavailable")));
            }
            Ok(())
        }
    }

    #[test]
    fn report_sends_one_notification_per_error() {
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = ErrorReporter::new(Arc::clone(&notifier));

        reporter.report(
            "handling checkCalendar alarm",
            &InfraError::Fetch(FetchError::HttpStatus { status: 500 }),
        );

        assert_eq!(
            notifier.messages(),
            vec!["An error occurred while handling checkCalendar alarm. Please check the log for details."]
        );
    }

    #[test]
    fn notifier_failure_does_not_escape() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let reporter = ErrorReporter::new(Arc::clone(&notifier));

        let notification = reporter.report("opening meeting", &InfraError::Auth("denied".to_string()));

        assert_eq!(notification.title, "Knob_joiner Error");
        assert_eq!(notifier.messages().len(), 1);
    }
}
