mod adapter;

pub use adapter::{V1_21Adapter, DEFAULT_PROTOCOL_VERSION};
