pub mod building;
pub mod energy;
pub mod export;
pub mod merge;
