pub mod soil;

pub use soil::*;
