pub mod pacing;
pub mod text_variation;

pub use pacing::*;
pub use text_variation::*;
