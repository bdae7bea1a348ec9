//! Clock port interface

use chrono::{DateTime, Utc};

/// Port for reading wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
