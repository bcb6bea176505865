pub mod posts;
pub mod products;
pub mod rules;
pub mod runner;
pub mod trigger;
