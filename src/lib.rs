#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod core;
mod error;
mod flatten;
pub mod param;
mod registry;
pub mod task;
mod utils;

pub use crate::config::ParamConfig;
pub use crate::core::{ArcStr, Hash32};
pub use crate::error::*;
pub use crate::flatten::{Structure, flatten};
pub use crate::param::{Codec, ParamKind, ParamRegistry, ParamValue, Parameter};
pub use crate::registry::TaskRegistry;
pub use crate::task::{
    Externalize, InstanceCache, RequiresFn, RunFn, Task, TaskSpec, TaskType, TaskTypeBuilder,
    TransientGuard, TransientHooks, TypeKey, externalize,
};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
