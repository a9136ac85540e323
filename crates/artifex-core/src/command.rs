//! Command abstractions.

use uuid::Uuid;

/// Trait that all commands implement.
///
/// Commands are requests to transition an aggregate. They are never
/// persisted; only their resulting events are.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;
}

/// Metadata carried by every command.
#[derive(Debug, Clone, Copy)]
pub struct CommandMetadata {
    /// Correlation ID to trace this command through the system.
    pub correlation_id: Uuid,
    /// The user issuing the command, when known.
    pub user_id: Option<Uuid>,
}
