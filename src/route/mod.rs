//! Declarative route definitions and the route table builder.

mod binding;
mod build;
mod types;

pub use binding::{Binding, Validate};
pub use build::build_route_table;
pub use types::RouteSpec;
