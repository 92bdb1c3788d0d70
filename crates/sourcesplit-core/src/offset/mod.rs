mod cache;
mod collection;
#[cfg(feature = "debug-tools")]
mod dump;
mod resolver;
mod scanner;
mod signature;

pub use cache::*;
pub use collection::*;
#[cfg(feature = "debug-tools")]
pub use dump::*;
pub use resolver::*;
pub use scanner::*;
pub use signature::*;
