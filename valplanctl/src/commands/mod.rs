pub mod knowledge;
pub mod pipeline;
