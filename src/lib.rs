#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod core;
mod engine;
mod error;
pub mod fei;
pub mod utils;

pub use crate::core::Hash32;
pub use crate::engine::{
    Arg, Args, Binding, Context, Execution, Memo, Node, OutputKey, Outputs, Payload, Report,
    Resolver, Resource, Sequence, Slot, Status, Task, TaskDef, Unresolved,
};
pub use crate::error::*;
pub use crate::fei::{FeiState, advance};
