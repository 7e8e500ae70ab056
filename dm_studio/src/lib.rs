pub use dm_engine::*;

pub mod assembler;
pub mod error;
pub mod gate;
pub mod guard;
pub mod notify;
pub mod preferences;
pub mod reminder;
pub mod resolver;
pub mod restore;
pub mod service;
pub mod session;
pub mod workspace;

pub use error::OperationError;
pub use service::PersistenceService;
