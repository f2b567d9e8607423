pub mod document;
pub mod pool;
pub mod store;
