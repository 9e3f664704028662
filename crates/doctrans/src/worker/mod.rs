pub mod delivery;
pub mod queue;
pub mod spool;

pub use delivery::{Delivery, JobPayload};
pub use queue::{JobOutcome, JobQueue, NoopObserver, QueueObserver, QueueSettings};
pub use spool::{Spool, SpoolRecord};
