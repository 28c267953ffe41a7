pub mod benchmark;
pub mod system;
