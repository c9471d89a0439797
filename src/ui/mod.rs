// UI module - everything that runs on, or talks to, the foreground thread
//
// This module contains:
// - ForegroundExecutor: submit-and-block dispatch onto the foreground thread
// - ForegroundHost: the services a host application provides (tick, views, toasts)
// - WaitingView: the cancellable "still saving" view
// - WaitCoordinator: waits on background saves without freezing the render loop

pub mod bridge;
pub mod coordinator;
pub mod host;
pub mod waiting;

pub use bridge::{ForegroundExecutor, ForegroundTask, TaskDropped, TaskHandle};
pub use coordinator::{WaitCoordinator, WaitError, WaitRequest, WaitSession, WaitState};
pub use host::{ForegroundHost, HeadlessHost, HostView, View, WORLDGEN_CONFIG_VIEW};
pub use waiting::WaitingView;
