// PhotonDB Vector Store
// Slot allocation and label mapping for similarity search indexes

#![warn(rust_2018_idioms)]

/// Abort the current operation on a broken precondition.
///
/// The diagnostic goes to the log before the panic so it survives
/// `panic = "abort"` builds.
macro_rules! check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            ::tracing::error!($($arg)+);
            panic!($($arg)+);
        }
    };
}

pub mod filter;
pub mod metric;
pub mod store;

// Re-exports for convenience
pub use filter::IdFilter;
pub use metric::{metric_for, Distance, MetricType};
pub use store::{
    AlignedAllocator, InitialReserve, Label, Location, StoreOptions, StoreStats, VectorBatch,
    VectorStore,
};

/// Vector store error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        #[error("Resource exhausted: {0}")]
        ResourceExhausted(String),

        #[error("Already exists: {0}")]
        AlreadyExists(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Unavailable: {0}")]
        Unavailable(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// Short machine-readable name, used as a metrics label
        pub fn kind(&self) -> &'static str {
            match self {
                Error::ResourceExhausted(_) => "resource_exhausted",
                Error::AlreadyExists(_) => "already_exists",
                Error::NotFound(_) => "not_found",
                Error::Unavailable(_) => "unavailable",
                Error::InvalidArgument(_) => "invalid_argument",
                Error::Config(_) => "config",
            }
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            Error::ResourceExhausted("no space".into()).to_string(),
            "Resource exhausted: no space"
        );
    }
}
