pub mod layout;
mod math;
mod process;
mod reader;
mod value;

#[cfg(test)]
pub mod mock;

pub use math::Vector3f;
pub use process::*;
pub use reader::{MemoryReader, ReadMemory, ReadValueExt};
pub use value::{LeBytes, RemoteValue};

#[cfg(test)]
pub use mock::{MockMemoryBuilder, MockMemoryReader};
