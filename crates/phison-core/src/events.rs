//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front-end) to follow a firmware update
//! without tight coupling to the core logic.

use std::fmt;

use crate::mode::DeviceMode;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// Firmware update phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Nothing started yet.
    Idle,
    /// Leaving the current firmware for boot mode.
    SwitchToBootMode,
    /// Loading and starting the burner image.
    LoadBurner,
    /// Rebooting into boot mode before the install.
    Reboot,
    /// First firmware transfer (selectors 01/00).
    FirstStage,
    /// Second firmware transfer (selectors 03/02).
    SecondStage,
    /// Firmware-update control commands.
    Commit,
    /// Jumping into the new code.
    Execute,
    /// Sequence finished.
    Complete,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePhase::Idle => write!(f, "Idle"),
            UpdatePhase::SwitchToBootMode => write!(f, "Switch to Boot Mode"),
            UpdatePhase::LoadBurner => write!(f, "Load Burner"),
            UpdatePhase::Reboot => write!(f, "Reboot"),
            UpdatePhase::FirstStage => write!(f, "First Stage"),
            UpdatePhase::SecondStage => write!(f, "Second Stage"),
            UpdatePhase::Commit => write!(f, "Commit"),
            UpdatePhase::Execute => write!(f, "Execute"),
            UpdatePhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Events emitted during an update.
#[derive(Debug, Clone)]
pub enum PhisonEvent {
    /// Phase changed.
    PhaseChanged { from: UpdatePhase, to: UpdatePhase },
    /// Progress update for current operation.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Device mode read back from the controller.
    ModeDetected { mode: DeviceMode },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving update events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait PhisonObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &PhisonEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl PhisonObserver for NullObserver {
    fn on_event(&self, _event: &PhisonEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl PhisonObserver for TracingObserver {
    fn on_event(&self, event: &PhisonEvent) {
        match event {
            PhisonEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            PhisonEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            PhisonEvent::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
            PhisonEvent::ModeDetected { mode } => {
                tracing::info!(mode = %mode, "Device mode");
            }
            PhisonEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
