mod motion;
mod path;
mod physics;

pub use motion::*;
pub use path::*;
pub use physics::*;
