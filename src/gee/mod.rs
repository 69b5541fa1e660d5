//! Client for the remote geospatial platform: authentication, the REST
//! surface, and the server-side expression builder.

mod auth;
mod client;
pub mod expression;

pub use client::EeClient;
