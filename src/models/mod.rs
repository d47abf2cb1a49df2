pub mod candidate;
pub mod endpoint;
pub mod run;

pub use candidate::*;
pub use endpoint::*;
pub use run::*;
