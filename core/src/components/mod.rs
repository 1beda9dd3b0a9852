pub mod flow;
pub mod node;
