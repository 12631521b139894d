//! Shared identifiers, error taxonomy, byte streams and configuration.

pub mod config;
pub mod error;
pub mod stream;
pub mod types;

pub use config::{ConfigError, CoreConfig, FileSystemConfig, LogOutput, LoggingConfig, SnapshotConfig};
pub use error::{CoreError, ErrorKind};
pub use stream::{ByteReader, ByteWriter};
pub use types::{ClassId, InstanceId};
