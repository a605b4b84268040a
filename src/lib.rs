//! lips: a small metacircular Lisp.
//!
//! Source text is read into heap values ([`reader`]), macro-expanded to a
//! fixed point ([`expand`]), evaluated against a chain of environment frames
//! ([`eval`], [`environment`]) and printed back ([`printer`]).

pub mod config;
pub mod environment;
pub mod error;
pub mod eval;
pub mod expand;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod repl;
pub mod stream;
pub mod symbol;
pub mod value;

pub use error::{LispError, LispResult};
pub use eval::Interpreter;
pub use value::Value;
