pub mod codec;
pub mod error;
pub mod image;
pub mod packer;
pub mod stub;
pub mod target;
pub mod trailer;

pub use codec::*;
pub use error::*;
pub use image::*;
pub use packer::*;
pub use stub::*;
pub use target::*;
pub use trailer::*;
