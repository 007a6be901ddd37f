pub mod handlers;
pub mod server;
pub mod static_files;

pub use server::{create_app, AppState, ProvisionerServer, PROVISION_PATH};
pub use static_files::{content_type_for, StaticAsset, StaticFiles};
