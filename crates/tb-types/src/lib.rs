pub mod errors;
pub mod params;
pub mod study;
pub mod trial;

pub use errors::*;
pub use params::*;
pub use study::*;
pub use trial::*;
