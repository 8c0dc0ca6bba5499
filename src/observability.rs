use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::console::Command;

// ── Console traffic ─────────────────────────────────────────────

/// Counter: console commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "fleetbook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "fleetbook_command_duration_seconds";

// ── Bookings ────────────────────────────────────────────────────

/// Gauge: bookings currently held across all vehicles.
pub const BOOKINGS_ACTIVE: &str = "fleetbook_bookings_active";

/// Counter: bookings confirmed.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "fleetbook_bookings_confirmed_total";

/// Counter: bookings cancelled by their owner.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "fleetbook_bookings_cancelled_total";

/// Counter: booking attempts rejected for overlapping an existing booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "fleetbook_booking_conflicts_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Counter: WAL compactions performed by the background compactor.
pub const WAL_COMPACTIONS_TOTAL: &str = "fleetbook_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Help => "help",
        Command::Register { .. } => "register",
        Command::Login { .. } => "login",
        Command::Logout => "logout",
        Command::WhoAmI => "whoami",
        Command::Users => "users",
        Command::AddVehicle { .. } => "add_vehicle",
        Command::RemoveVehicle { .. } => "remove_vehicle",
        Command::Vehicles => "vehicles",
        Command::Available { .. } => "available",
        Command::Check { .. } => "check",
        Command::Book { .. } => "book",
        Command::Cancel { .. } => "cancel",
        Command::Bookings { .. } => "bookings",
        Command::MyBookings => "my_bookings",
        Command::Compact => "compact",
        Command::Quit => "quit",
    }
}
