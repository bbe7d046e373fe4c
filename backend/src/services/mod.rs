pub mod email;
pub mod notifications;

pub use email::{EmailService, LogEmailService, SmtpEmailService};
pub use notifications::{BroadcastNotificationService, NotificationService, UserNotification};
