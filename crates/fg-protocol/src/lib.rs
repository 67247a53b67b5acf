pub mod commands;
pub mod device;
pub mod identity;
pub mod shadows;
pub mod topics;

pub use commands::*;
pub use device::*;
pub use identity::*;
pub use shadows::*;
