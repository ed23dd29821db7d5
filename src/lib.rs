pub mod allocation;
pub mod sources;
