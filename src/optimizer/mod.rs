pub mod battery;
pub mod extract;
pub mod global;
pub mod local;
pub mod model;
pub mod solver;

pub use extract::*;
pub use global::*;
pub use local::*;
pub use model::*;
pub use solver::*;
