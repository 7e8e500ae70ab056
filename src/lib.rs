pub mod archive;
pub mod assets;
pub mod config;
pub mod registry;
pub mod scene;
pub mod settings;
pub mod snapshot;
pub mod time;

pub use archive::{ArchiveCodec, ArchiveError};
pub use config::PersistenceConfig;
pub use registry::TypeRegistry;
pub use snapshot::{ProjectManifest, ProjectSnapshot};
