//! Application layer for the Image Generation context.

pub mod command_handlers;
pub mod query_handlers;

pub use command_handlers::{CommandBus, CommandOutcome};
pub use query_handlers::{GenerationQuery, GenerationQueryKind, QueryBus, QueryError, QueryOutcome};
