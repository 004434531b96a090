pub mod reply_repo;
pub mod schema;
pub mod template_repo;
pub mod user_repo;
pub mod video_repo;

pub use reply_repo::*;
pub use schema::*;
pub use template_repo::*;
pub use user_repo::*;
pub use video_repo::*;
