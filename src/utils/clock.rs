use chrono::{DateTime, Local};

/// Represents an entity responsible for providing the current time across the application. This
/// allows tests to pin "now".
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }
}
