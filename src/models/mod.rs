pub mod replied_comment;
pub mod template;
pub mod user;
pub mod video;

pub use replied_comment::*;
pub use template::*;
pub use user::*;
pub use video::*;
