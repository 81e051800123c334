//! Instrumented request handling for the ping and pong endpoints.

pub mod downstream;
pub mod handler;

pub use downstream::{Downstream, HttpDownstream};
pub use handler::{EndpointSpec, RequestHandler, RequestMeta};
