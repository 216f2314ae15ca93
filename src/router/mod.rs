//! Path compilation, typed parameters and route resolution.

mod core;
mod param;
mod path;
#[cfg(test)]
mod tests;

pub use core::{normalize_request_path, CompiledRoute, RouteKind, RouteMatch, Router};
pub use param::{
    ParamDescriptor, ParamType, ParamValue, ParamVec, PathParam, FILEPATH_PARAM,
    MAX_INLINE_PARAMS,
};
pub use path::{compile_path, join_paths, CompiledPath};
