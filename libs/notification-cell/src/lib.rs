pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{NewNotification, Notification, NotificationError, NotificationType};
pub use router::notification_routes;
pub use services::NotificationService;
