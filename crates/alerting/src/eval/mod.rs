//! Rule evaluation: per-attempt context, condition folding, dry runs.

mod context;
mod handler;
mod tester;

pub use context::{EvalContext, ResultLogEntry};
pub use handler::{DefaultEvalHandler, EvalHandler};
pub use tester::RuleTester;
