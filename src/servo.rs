//! Airbrake servo controller (spec §4.5).
//!
//! Reads the published telemetry record, applies the stall watchdog, and
//! maps a desired open/closed boolean to a PWM pulse width. The
//! clamped-linear-interpolation mapping generalizes
//! `drivers::roll::unit_to_dshot`'s ESC-value mapping from DShot throttle
//! values to servo pulse-width microseconds; there is no DShot bit-frame
//! here since the airbrake actuator is a plain PWM servo.

use crate::config::Config;
use crate::telemetry::TelemetryRecord;
use crate::types::{fc_flags::*, FcState};

/// Map a commanded deploy angle (degrees, clamped to
/// `[0, cfg.servo_max_deploy_deg]`) to a pulse width in microseconds.
pub fn map_deg_to_pulse_us(cfg: &Config, deg: f32) -> u16 {
    let clamped = deg.clamp(0.0, cfg.servo_max_deploy_deg);
    let frac = if cfg.servo_max_deploy_deg > 0.0 {
        clamped / cfg.servo_max_deploy_deg
    } else {
        0.0
    };
    let closed = cfg.servo_pulse_closed_us as f32;
    let open = cfg.servo_pulse_open_us as f32;
    (closed + frac * (open - closed)).round() as u16
}

/// Persistent servo state: last-seen telemetry timestamp (for the stall
/// watchdog) and the current commanded open/closed edge.
pub struct ServoController {
    last_timestamp_ms: Option<u32>,
    is_open: bool,
}

impl Default for ServoController {
    fn default() -> Self {
        Self {
            last_timestamp_ms: None,
            is_open: false,
        }
    }
}

impl ServoController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// One tick of the servo loop. Returns the pulse width to drive.
    pub fn tick(&mut self, cfg: &Config, record: &TelemetryRecord) -> u16 {
        let stalled = match self.last_timestamp_ms {
            Some(prev) => record.timestamp_ms == prev,
            None => false,
        };
        self.last_timestamp_ms = Some(record.timestamp_ms);

        if stalled {
            self.is_open = false;
            return map_deg_to_pulse_us(cfg, 0.0);
        }

        let flags = record.fc.flags;
        let imu_a_ok = flags & FCF_SENS_IMU_A_OK != 0;
        let baro_ok = flags & FCF_SENS_BMP1_OK != 0;
        let imu_b_ok = flags & FCF_SENS_IMU_B_OK != 0;
        let agl_ready = flags & FCF_AGL_READY != 0;
        let tilt_latched = flags & FCF_TILT_LATCH != 0;

        let required = record.fc.state == FcState::Window
            && imu_a_ok
            && baro_ok
            && imu_b_ok
            && agl_ready
            && !tilt_latched
            && record.fc.mach_conservative.is_finite()
            && record.fc.mach_conservative < 0.5
            && record.fc.state != FcState::Boost;

        let disqualified = matches!(record.fc.state, FcState::AbortLockout | FcState::Locked)
            || !imu_a_ok
            || !baro_ok
            || !imu_b_ok
            || tilt_latched
            || (record.fc.t_to_apogee_s.is_finite() && record.fc.t_to_apogee_s <= 1.0);

        let should_be_open = required && !disqualified;

        if should_be_open != self.is_open {
            self.is_open = should_be_open;
        }

        map_deg_to_pulse_us(cfg, if self.is_open { cfg.servo_max_deploy_deg } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaroReading, FcStatus, FusedAlt, ImuAReading, ImuBReading};

    fn base_record(state: FcState, flags: u32, timestamp_ms: u32) -> TelemetryRecord {
        TelemetryRecord {
            seq: 1,
            timestamp_ms,
            bmp: BaroReading::default(),
            imu_a: ImuAReading::default(),
            imu_b: ImuBReading::default(),
            vbat_mv: 7400,
            bus_error_count: 0,
            fc: FcStatus {
                state,
                flags,
                airbrake_cmd_deg: 0.0,
                t_since_launch_s: 13.0,
                t_to_apogee_s: 4.0,
                mach_conservative: 0.1,
                tilt_deg: 0.0,
            },
            airbrake_cmd_deg: 0.0,
            airbrake_actual_deg: 0.0,
            fused: FusedAlt::default(),
        }
    }

    const ALL_OK: u32 = FCF_SENS_IMU_A_OK | FCF_SENS_BMP1_OK | FCF_SENS_IMU_B_OK | FCF_AGL_READY | FCF_TILT_OK | FCF_MACH_OK;

    #[test]
    fn opens_only_in_window_with_all_required_conditions() {
        let cfg = Config::default();
        let mut servo = ServoController::new();
        let rec = base_record(FcState::Window, ALL_OK, 1000);
        let pulse = servo.tick(&cfg, &rec);
        assert!(servo.is_open());
        assert_eq!(pulse, cfg.servo_pulse_open_us);
    }

    #[test]
    fn stays_closed_outside_window() {
        let cfg = Config::default();
        let mut servo = ServoController::new();
        let rec = base_record(FcState::PostBurnHold, ALL_OK, 1000);
        let pulse = servo.tick(&cfg, &rec);
        assert!(!servo.is_open());
        assert_eq!(pulse, cfg.servo_pulse_closed_us);
    }

    #[test]
    fn tilt_latch_forces_closed_even_in_window() {
        let cfg = Config::default();
        let mut servo = ServoController::new();
        let rec = base_record(FcState::Window, ALL_OK | FCF_TILT_LATCH, 1000);
        servo.tick(&cfg, &rec);
        assert!(!servo.is_open());
    }

    #[test]
    fn stall_watchdog_forces_retract() {
        let cfg = Config::default();
        let mut servo = ServoController::new();
        let rec_open = base_record(FcState::Window, ALL_OK, 1000);
        servo.tick(&cfg, &rec_open);
        assert!(servo.is_open());

        let stalled = base_record(FcState::Window, ALL_OK, 1000); // same timestamp
        let pulse = servo.tick(&cfg, &stalled);
        assert!(!servo.is_open());
        assert_eq!(pulse, cfg.servo_pulse_closed_us);
    }

    #[test]
    fn near_apogee_disqualifier_forces_closed() {
        let cfg = Config::default();
        let mut servo = ServoController::new();
        let mut rec = base_record(FcState::Window, ALL_OK, 1000);
        rec.fc.t_to_apogee_s = 0.5;
        servo.tick(&cfg, &rec);
        assert!(!servo.is_open());
    }
}
