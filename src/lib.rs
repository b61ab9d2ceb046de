pub mod error;
pub mod config;
pub mod series;
pub mod window;
pub mod traits;
pub mod interpolate;
pub mod spectrum;
pub mod tracker;
pub mod fusion;
pub mod policy;
pub mod controller;
pub mod sampler;
pub mod signals;
pub mod summary;
