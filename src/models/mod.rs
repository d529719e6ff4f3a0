pub mod case;
pub mod enums;
pub mod legacy;
pub mod rules;

pub use case::*;
pub use legacy::*;
pub use rules::*;
