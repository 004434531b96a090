pub mod credential_service;
pub mod jobs;
pub mod platform_client;
pub mod quota_service;
pub mod reply_engine;
pub mod scheduler_service;
pub mod task_runner;

pub use credential_service::*;
pub use jobs::*;
pub use platform_client::*;
pub use quota_service::*;
pub use reply_engine::*;
pub use scheduler_service::*;
pub use task_runner::*;
