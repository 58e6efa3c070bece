pub mod capacity;
pub mod model;
pub mod word;
