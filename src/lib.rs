pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod image;
pub mod model;
pub mod render;
pub mod system;
pub mod tracking;
