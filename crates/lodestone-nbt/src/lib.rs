mod nbt;
mod skip;

pub use nbt::*;
pub use skip::*;
