pub mod harvest;
pub mod identity;
pub mod post;
pub mod warning;

pub use harvest::*;
pub use identity::*;
pub use post::*;
pub use warning::*;
