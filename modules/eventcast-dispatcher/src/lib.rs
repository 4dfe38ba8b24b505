pub mod dispatcher;
pub mod notify;
pub mod payload;
pub mod pipeline;
pub mod record;
pub mod resolver;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod watcher;

pub use dispatcher::{DispatchReport, Dispatcher, DispatcherHandle, DispatcherSettings};
pub use notify::backend::{DeliveryOutcome, PushGateway};
pub use record::{ChangeRecord, ValidationError};
pub use resolver::EntityResolver;
pub use stats::{DispatchStats, StatsSnapshot};
