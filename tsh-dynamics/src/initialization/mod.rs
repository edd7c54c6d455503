pub use io::*;
pub use simulation::*;
pub use system::*;

pub mod io;
pub mod restart;
pub mod sampling;
pub mod simulation;
pub mod system;
