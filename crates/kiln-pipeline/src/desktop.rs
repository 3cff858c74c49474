//! Desktop notifications for build errors.

use notify_rust::Notification;

/// Build the notification shown for one error.
pub fn notification(title: &str, message: &str) -> Notification {
    let mut notification = Notification::new();
    notification.appname("kiln").summary(title).body(message);
    notification
}

/// Show a notification. Failure to reach the desktop is logged and ignored.
pub fn notify(title: &str, message: &str) {
    if let Err(e) = notification(title, message).show() {
        tracing::debug!("Desktop notification failed: {}", e);
    }
}
