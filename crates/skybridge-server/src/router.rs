use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use skybridge_core::{Command, CommandFrame};

use crate::registry::ConnectionRegistry;

/// Routes decoded commands to the matching live session. Lookup only;
/// the registry keeps session lifecycle to itself.
pub struct CommandRouter {
    registry: Arc<ConnectionRegistry>,
}

impl CommandRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch to the target session. An absent target and a failed
    /// bounded send are both logged and dropped; dispatch never fails and
    /// never blocks the caller.
    pub fn dispatch(&self, command: Command) {
        let Some(tx) = self.registry.lookup(&command.client_id) else {
            tracing::debug!(
                client_id = %command.client_id,
                command = %command.command,
                "No connected session for command, dropping"
            );
            return;
        };

        let client_id = command.client_id.clone();
        match tx.try_send(CommandFrame::from(command)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id = %client_id, "Session send queue full, dropping command");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client_id = %client_id, "Session closed mid-dispatch, dropping command");
            }
        }
    }
}
