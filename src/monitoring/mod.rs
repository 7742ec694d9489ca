/*!
 * Monitoring
 * Structured logging and per-operation tracing spans
 */

mod tracer;

pub use tracer::{init_tracing, OperationSpan};
