mod persist;
pub use persist::*;
mod store;
pub use store::*;
