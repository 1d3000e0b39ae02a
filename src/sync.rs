//! Shared concurrency primitives (spec §4.6, §5).
//!
//! Same single-writer/many-reader mutex pattern the firmware already uses
//! for `BaroData`/`GpsData`/`RcData` in `state.rs`, plus an
//! `AtomicBool`-backed edge-triggered request flag modeled on `main.rs`'s
//! `TAB_MOTOR_DSHOT_CMD: AtomicU16` shared-state cell.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;

use crate::telemetry::TelemetryRecord;

/// Depth of the optional telemetry sink channel (spec §4.4).
pub const TELEMETRY_SINK_DEPTH: usize = 8;

/// The aggregator's sole-writer telemetry record (spec §4.4, §5: "the
/// aggregator is the sole writer... consumers never write").
pub struct TelemetryStore {
    inner: Mutex<CriticalSectionRawMutex, TelemetryRecord>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(TelemetryRecord::default()),
        }
    }
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored record. Sole writer: the telemetry aggregator
    /// task.
    pub async fn publish(&self, record: TelemetryRecord) {
        let mut guard = self.inner.lock().await;
        *guard = record;
    }

    /// Copy out the current record. Many readers (servo controller, command
    /// surface, monitoring link).
    pub async fn get(&self) -> TelemetryRecord {
        *self.inner.lock().await
    }
}

/// Optional bounded sink for consumers that want every published record
/// rather than just the latest (spec §4.4: "optionally pushes a copy into a
/// bounded `embassy_sync::channel::Channel` sink that coalesces (drops
/// oldest) on overflow"). Modeled on the teacher's `Channel<_, _, 1>`
/// "latest wins" channels in `main.rs`, generalized to a deeper queue with
/// explicit drop-oldest-on-full behavior instead of `Channel`'s single-slot
/// overwrite.
pub struct TelemetrySink {
    chan: Channel<CriticalSectionRawMutex, TelemetryRecord, TELEMETRY_SINK_DEPTH>,
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self { chan: Channel::new() }
    }
}

impl TelemetrySink {
    pub const fn new() -> Self {
        Self { chan: Channel::new() }
    }

    /// Push a record. If the sink is full, the oldest queued record is
    /// dropped to make room rather than blocking or dropping the new one.
    pub fn push(&self, record: TelemetryRecord) {
        if self.chan.try_send(record).is_err() {
            let _ = self.chan.try_receive();
            let _ = self.chan.try_send(record);
        }
    }

    /// Await the next queued record.
    pub async fn recv(&self) -> TelemetryRecord {
        self.chan.receive().await
    }

    /// Non-blocking drain of the next queued record, if any.
    pub fn try_recv(&self) -> Option<TelemetryRecord> {
        self.chan.try_receive().ok()
    }
}

/// Edge-triggered soft-reset request, consumed once at the top of the
/// target task's next tick (spec §5: "single-word writes... take effect at
/// the top of the target task's next tick").
pub struct SoftResetFlag {
    requested: AtomicBool,
}

impl SoftResetFlag {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Raise the request (called from the monitoring command parser).
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Consume the request if raised, clearing it atomically. Call this
    /// once at the top of each tick in every task that must honor
    /// soft-reset.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for SoftResetFlag {
    fn default() -> Self {
        Self::new()
    }
}
