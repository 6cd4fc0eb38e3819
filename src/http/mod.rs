//! HTTP response types, extractors and the RouteModule trait.

pub mod path;
pub mod response;
pub mod routes;

pub use path::PathParams;
pub use response::{CreatedResponse, NoContentResponse};
pub use routes::RouteModule;
