use crate::models::NotificationRequest;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub const GOLDEN_NOTIFICATION_TITLE: &str = "Golden Hour started!";
pub const GOLDEN_NOTIFICATION_BODY: &str = "It's golden hour now.";

/// Platform notification permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Permission {
    Granted,
    /// Not decided yet; a request is made before the first notification
    #[value(name = "ask")]
    Undetermined,
    Denied,
}

pub type PermissionFuture<'a> = Pin<Box<dyn Future<Output = Permission> + Send + 'a>>;

/// Desktop notification sink gated by permission
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;
    fn request_permission(&self) -> PermissionFuture<'_>;
    fn show(&self, request: &NotificationRequest) -> Result<(), String>;
}

pub fn golden_hour_notification() -> NotificationRequest {
    NotificationRequest {
        title: GOLDEN_NOTIFICATION_TITLE.to_string(),
        body: GOLDEN_NOTIFICATION_BODY.to_string(),
    }
}

/// Fire one notification attempt respecting permission state.
/// Returns true when the notification was handed to the platform.
/// Denied (or a request that resolves to anything but granted) suppresses it; nothing is retried.
pub async fn deliver(notifier: &dyn Notifier, request: &NotificationRequest) -> bool {
    let permission = match notifier.permission() {
        Permission::Undetermined => {
            let resolved = notifier.request_permission().await;
            info!("[NOTIFY] Permission request resolved: {:?}", resolved);
            resolved
        }
        other => other,
    };

    if permission != Permission::Granted {
        debug!("[NOTIFY] Permission {:?}, notification suppressed", permission);
        return false;
    }

    match notifier.show(request) {
        Ok(()) => {
            info!("[NOTIFY] Shown: {}", request.title);
            true
        }
        Err(e) => {
            warn!("[NOTIFY] Failed to show notification: {}", e);
            false
        }
    }
}

/// notify-rust backed notifier. Desktop notification daemons have no permission prompt,
/// so a request from the undetermined state resolves to granted.
pub struct DesktopNotifier {
    permission: Mutex<Permission>,
}

impl DesktopNotifier {
    pub fn new(initial: Permission) -> Self {
        Self {
            permission: Mutex::new(initial),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn permission(&self) -> Permission {
        self.permission
            .lock()
            .map(|p| *p)
            .unwrap_or(Permission::Denied)
    }

    fn request_permission(&self) -> PermissionFuture<'_> {
        Box::pin(async move {
            match self.permission.lock() {
                Ok(mut p) => {
                    if *p == Permission::Undetermined {
                        *p = Permission::Granted;
                    }
                    *p
                }
                Err(e) => {
                    warn!("[NOTIFY] Mutex poisoned: {}", e);
                    Permission::Denied
                }
            }
        })
    }

    fn show(&self, request: &NotificationRequest) -> Result<(), String> {
        notify_rust::Notification::new()
            .summary(&request.title)
            .body(&request.body)
            .appname("golden-timer")
            .show()
            .map(|_| ())
            .map_err(|e| format!("{}", e))
    }
}
