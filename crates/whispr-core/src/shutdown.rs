//! Graceful Shutdown Manager
//!
//! Coordinates shutdown between the HTTP server and long-lived gateway
//! connections.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//!
//! // Each gateway connection holds a guard and a child token
//! let guard = shutdown.register_task();
//! let token = shutdown.token();
//!
//! // Cancel every token, then wait for guards to drop
//! shutdown.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default drain timeout in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Shutdown requested - stop accepting new connections
    Stopping,
    /// Waiting for open connections to finish their cleanup
    Draining,
    /// Shutdown complete
    Terminated,
}

impl ShutdownPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shutdown controller for coordinating graceful shutdown
#[derive(Debug)]
pub struct ShutdownController {
    /// Parent of every component token
    cancel_token: CancellationToken,
    /// Cancelled when some component asks the server to stop
    request_token: CancellationToken,
    phase: AtomicU8,
    shutdown_initiated: AtomicBool,
    active_tasks: AtomicUsize,
    drained: Notify,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a new shutdown controller with default timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Create a new shutdown controller with custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            request_token: CancellationToken::new(),
            phase: AtomicU8::new(ShutdownPhase::Running as u8),
            shutdown_initiated: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            drained: Notify::new(),
            timeout,
        })
    }

    /// Get a cancellation token for a component
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Get current shutdown phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Check if shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Ask the server to shut down without waiting for it.
    pub fn request_shutdown(&self) {
        if !self.request_token.is_cancelled() {
            info!("Shutdown requested");
            self.request_token.cancel();
        }
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) has been called.
    pub async fn requested(&self) {
        self.request_token.cancelled().await;
    }

    /// Register a long-lived task that must finish before shutdown completes
    pub fn register_task(self: &Arc<Self>) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: Arc::clone(self),
        }
    }

    /// Get the count of active tasks
    #[must_use]
    pub fn active_task_count(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    fn task_finished(&self) {
        if self.active_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Initiate graceful shutdown
    ///
    /// Cancels every component token, then waits (up to the drain timeout)
    /// for registered tasks to drop their guards. Only the first call does
    /// any work.
    pub async fn shutdown(self: &Arc<Self>) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown...");
        self.set_phase(ShutdownPhase::Stopping);
        self.request_token.cancel();

        self.set_phase(ShutdownPhase::Draining);
        self.cancel_token.cancel();

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if self.active_task_count() == 0 {
                    break;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(self.timeout, drain).await {
            Ok(()) => info!("All tasks completed gracefully"),
            Err(_) => warn!(
                active_tasks = self.active_task_count(),
                timeout_secs = self.timeout.as_secs(),
                "Shutdown timeout exceeded, abandoning remaining tasks"
            ),
        }

        self.set_phase(ShutdownPhase::Terminated);
        info!("Graceful shutdown complete");
    }
}

/// Guard for tracking an active task
///
/// Decrements the active task count when dropped.
#[derive(Debug)]
pub struct TaskGuard {
    controller: Arc<ShutdownController>,
}

impl TaskGuard {
    /// Check if shutdown was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.controller.cancel_token.is_cancelled()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.task_finished();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Resolves on an OS signal or an internal shutdown request, after running
/// the controller's graceful shutdown.
pub async fn shutdown_signal_with_controller(controller: Arc<ShutdownController>) {
    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        _ = controller.requested() => {}
    }
    controller.shutdown().await;
}
