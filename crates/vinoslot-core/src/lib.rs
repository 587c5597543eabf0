pub mod artifact;
pub mod backend;
pub mod device;
pub mod error;
pub mod ir;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use device::*;
pub use error::*;
pub use spec::*;
pub use tensor::*;
