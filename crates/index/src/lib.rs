pub mod error;
pub mod key;
pub mod tiger;

pub use error::{IndexError, Result};
pub use key::AccessibleSetKey;
pub use tiger::TigerCache;
