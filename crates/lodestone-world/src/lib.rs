mod blocks;
mod chunk;
mod entities;
mod world;

pub use blocks::*;
pub use chunk::*;
pub use entities::*;
pub use world::*;
