pub mod clock;
pub mod config;
pub mod events;
pub mod model;
pub mod probability;
pub mod sim;
