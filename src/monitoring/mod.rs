/*!
 * Monitoring Module
 * Structured logging setup
 */

pub mod tracer;

pub use tracer::init_tracing;
