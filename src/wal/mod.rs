pub mod log_manager;
pub mod log_record;
pub mod recovery;

pub use log_manager::{LogManager, LogManagerConfig};
pub use log_record::{LogPayload, LogRecord, LogRecordType};
pub use recovery::{LogRecovery, RecoveryError};
