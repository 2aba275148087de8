//! Task collaborators: external programs and builtin routines

mod builtin;
mod program;

pub use builtin::{BuiltinRegistry, BuiltinTask};
pub use program::{CommandRunner, ProgramRunner};
