//! Types shared between the simulation host and the browser renderer.

pub mod config;
pub mod protocol;
pub mod vec3;
