#![doc = include_str!("../README.md")]

mod error;
pub mod kdtree;
mod r#type;
mod util;

pub use error::{KdTreeError, Result};
pub use r#type::Point;

#[cfg(test)]
pub(crate) mod test;
