// ── External collaborators ──
//
// Device actions and remote commands are executed by components outside
// this crate. The router hands requests to these traits and relays the
// answers back to the client that asked.

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::hub::Responder;
use crate::message::{ActionRequest, ActionResponse, CommandRequest, CommandResponse};

/// Executes `DEVICE_ACTION` requests against one or more devices.
pub trait ActionDispatcher: Send + Sync {
    /// Run the action and resolve with exactly one response.
    fn dispatch(&self, request: ActionRequest) -> BoxFuture<'static, ActionResponse>;
}

/// Runs `PSTOOLS_COMMAND` requests.
///
/// A command may stream several responses over time; each one goes out
/// through the `Responder`, which stays valid for as long as the client
/// is connected.
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: CommandRequest, responder: Responder);
}

/// Answers every action with an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredActions;

impl ActionDispatcher for UnconfiguredActions {
    fn dispatch(&self, request: ActionRequest) -> BoxFuture<'static, ActionResponse> {
        debug!(action = %request.action, "no action dispatcher configured");
        Box::pin(async { ActionResponse::failed("device actions are not configured") })
    }
}

/// Answers every command once with an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCommands;

impl CommandRunner for UnconfiguredCommands {
    fn run(&self, request: CommandRequest, responder: Responder) {
        debug!(mode = %request.mode, target = %request.target, "no command runner configured");
        responder.send(CommandResponse {
            err: Some("remote commands are not configured".into()),
            result: None,
        });
    }
}
