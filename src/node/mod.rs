pub mod model;

pub use model::{Node, NodeSnapshot};
