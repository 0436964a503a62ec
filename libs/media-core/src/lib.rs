pub mod constants;
pub mod model;
pub mod resolution;
pub mod stage;
pub mod validate;

pub use constants::*;
pub use model::*;
pub use resolution::*;
pub use stage::*;
