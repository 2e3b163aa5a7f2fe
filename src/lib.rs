pub mod anchor;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
pub mod merkle;
pub mod service;
pub mod state;

pub use anchor::{ChainAdapter, Receipt, SimulatedAdapter};
pub use config::{AnchorConfig, StoreConfig};
pub use crypto::hash::{Hash256, HashAlgorithm, HashProvider};
pub use error::{AnchorError, Result};
pub use event::ConsentEvent;
pub use service::{AnchorService, VerifyOutcome, VerifyStatus};
pub use state::{BatchStore, MemoryStore, SqliteStore};
