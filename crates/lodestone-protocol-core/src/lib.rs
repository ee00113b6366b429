pub mod codec;
pub mod state;
pub mod packets;
pub mod adapter;
pub mod conn;

pub use codec::*;
pub use state::*;
pub use packets::*;
pub use adapter::*;
pub use conn::{Connection, ConnectionReader, ConnectionWriter};
