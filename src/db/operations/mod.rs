pub mod content;
pub mod learning;
pub mod user;

pub use content::*;
pub use learning::*;
pub use user::*;
