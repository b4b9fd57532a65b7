pub mod finding;
pub mod log;
pub mod run;

pub use finding::*;
pub use log::*;
pub use run::*;
