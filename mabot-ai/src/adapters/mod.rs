//! Concrete collaborators: local drive store, Gemini model client and the
//! remote warehouse client

pub mod gemini_client;
pub mod local_drive;
pub mod warehouse_client;

pub use gemini_client::GeminiClient;
pub use local_drive::LocalDrive;
pub use warehouse_client::WarehouseClient;
