//! Flight-controller state machine (spec §4.3).
//!
//! Pure, synchronous `tick()` over a context struct that owns every debounce
//! accumulator, latch and state-entry timestamp. The source FSM this is
//! modeled on kept that state in function-local statics; here it lives in
//! `FcContext` so `soft_reset()` clears it completely (spec §9 open
//! question, resolved in favor of the context struct).

use crate::config::Config;
use crate::types::{fc_flags::*, BaroReading, FcState, FcStatus, FusedAlt, ImuAReading, ImuBReading};

/// Debounced good/bad accumulator for one sensor's validity (spec §4.3).
#[derive(Clone, Copy, Default)]
struct SensorDebounce {
    good_ms: u32,
    bad_ms: u32,
    ok: bool,
}

impl SensorDebounce {
    fn update(&mut self, cfg: &Config, dt_ms: u32, valid: bool) {
        if valid {
            self.good_ms = self.good_ms.saturating_add(dt_ms);
            self.bad_ms = 0;
        } else {
            self.bad_ms = self.bad_ms.saturating_add(dt_ms);
            self.good_ms = 0;
        }

        if self.ok && self.bad_ms >= cfg.fc_sensor_invalid_ms {
            self.ok = false;
        } else if !self.ok && self.good_ms >= cfg.fc_sensor_recovery_ms {
            self.ok = true;
        }
    }
}

/// Dwell-gated boolean: tracks how long a condition has held true/false and
/// exposes the debounced state once the dwell is satisfied.
#[derive(Clone, Copy, Default)]
struct DwellGate {
    held_ms: u32,
    latched: bool,
}

impl DwellGate {
    fn update(&mut self, dt_ms: u32, condition: bool, dwell_ms: u32) -> bool {
        if condition {
            self.held_ms = self.held_ms.saturating_add(dt_ms);
            if self.held_ms >= dwell_ms {
                self.latched = true;
            }
        } else {
            self.held_ms = 0;
            self.latched = false;
        }
        self.latched
    }
}

/// One-shot latch: becomes true the first tick `condition` is sustained for
/// `dwell_ms`, then stays true forever (until `reset`).
#[derive(Clone, Copy, Default)]
struct OneShot {
    held_ms: u32,
    fired: bool,
}

impl OneShot {
    fn update(&mut self, dt_ms: u32, condition: bool, dwell_ms: u32) -> bool {
        if self.fired {
            return true;
        }
        if condition {
            self.held_ms = self.held_ms.saturating_add(dt_ms);
            if self.held_ms >= dwell_ms {
                self.fired = true;
            }
        } else {
            self.held_ms = 0;
        }
        self.fired
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// All FC-owned persistent state (spec §4.3 "Persistent context").
pub struct FcContext {
    state: FcState,
    state_entry_ms: u32,

    imu_a: SensorDebounce,
    baro: SensorDebounce,
    imu_b: SensorDebounce,

    tilt_dwell: DwellGate,
    tilt_latched: bool,

    mach_on_dwell: DwellGate,
    mach_ok: bool,

    baro_agree_dwell: DwellGate,

    liftoff: OneShot,
    t_launch_ms: Option<u32>,

    burnout: OneShot,
    post_burn_hold_entry_ms: Option<u32>,
}

impl Default for FcContext {
    fn default() -> Self {
        Self {
            state: FcState::Preflight,
            state_entry_ms: 0,
            imu_a: SensorDebounce::default(),
            baro: SensorDebounce::default(),
            imu_b: SensorDebounce::default(),
            tilt_dwell: DwellGate::default(),
            tilt_latched: false,
            mach_on_dwell: DwellGate::default(),
            mach_ok: false,
            baro_agree_dwell: DwellGate::default(),
            liftoff: OneShot::default(),
            t_launch_ms: None,
            burnout: OneShot::default(),
            post_burn_hold_entry_ms: None,
        }
    }
}

impl FcContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FcState {
        self.state
    }

    /// Clear all debounce accumulators, latches and the state machine to
    /// power-on defaults (spec §4.3 "Soft reset").
    pub fn soft_reset(&mut self) {
        *self = Self::default();
    }

    fn enter(&mut self, state: FcState, now_ms: u32) {
        self.state = state;
        self.state_entry_ms = now_ms;
    }

    pub fn tick(
        &mut self,
        cfg: &Config,
        dt_ms: u32,
        now_ms: u32,
        fused: &FusedAlt,
        baro: &BaroReading,
        imu_a: &ImuAReading,
        imu_b: &ImuBReading,
    ) -> FcStatus {
        // ── Sensor validity debounce ──────────────────────────────────────
        self.imu_a.update(cfg, dt_ms, imu_a.valid);
        self.baro.update(cfg, dt_ms, baro.valid);
        self.imu_b.update(cfg, dt_ms, imu_b.valid);

        // ── Tilt gate + absorbing latch ────────────────────────────────────
        let tilt = fused.tilt;
        let tilt_exceeded = tilt.is_finite() && tilt >= cfg.fc_tilt_abort_deg;
        if self
            .tilt_dwell
            .update(dt_ms, tilt_exceeded, cfg.fc_tilt_abort_dwell_ms)
        {
            self.tilt_latched = true;
        }
        let tilt_ok = !self.tilt_latched && tilt.is_finite() && tilt <= cfg.fc_tilt_abort_deg;

        // ── Conservative Mach gate: hysteresis + dwell ON, immediate OFF ──────
        let mach = fused.mach_conservative;
        if mach.is_finite() && mach > cfg.fc_mach_max_for_deploy + cfg.fc_mach_hyst {
            self.mach_ok = false;
            self.mach_on_dwell = DwellGate::default();
        } else {
            let below_threshold = mach.is_finite() && mach < cfg.fc_mach_max_for_deploy;
            if self
                .mach_on_dwell
                .update(dt_ms, below_threshold, cfg.fc_mach_dwell_ms)
            {
                self.mach_ok = true;
            }
        }

        // ── Baro agreement gate ───────────────────────────────────────────────
        let both_finite = fused.bmp_alt.is_finite() && fused.imu_alt.is_finite();
        let agreeing = both_finite && (fused.bmp_alt - fused.imu_alt).abs() <= cfg.fc_baro_agree_m;
        let baro_agree = if both_finite {
            self.baro_agree_dwell.update(dt_ms, agreeing, cfg.fc_baro_agree_ms)
        } else {
            self.baro_agree_dwell = DwellGate::default();
            false
        };

        // ── Liftoff detection (OR of 3 conditions, one-shot) ────────────────
        let liftoff_condition = (fused.vz_fused.is_finite() && fused.vz_fused > cfg.fc_vz_liftoff_mps)
            || (fused.az_earth.is_finite() && fused.az_earth > cfg.fc_az_liftoff_mps2)
            || (fused.agl_fused.is_finite() && fused.agl_fused >= cfg.fc_liftoff_min_agl_m);
        let liftoff_det = self.liftoff.update(dt_ms, liftoff_condition, cfg.fc_liftoff_dwell_ms);
        if liftoff_det && self.t_launch_ms.is_none() {
            self.t_launch_ms = Some(now_ms);
        }

        // ── Burnout detection (one-shot, only meaningful post-liftoff) ──────────
        let burnout_condition =
            liftoff_det && fused.az_earth.is_finite() && fused.az_earth <= cfg.fc_burnout_az_done_mps2;
        let burnout_det = self.burnout.update(dt_ms, burnout_condition, cfg.fc_burnout_dwell_ms);

        // ── Flags ──────────────────────────────────────────────────────────────
        let mut flags: u32 = 0;
        if self.imu_a.ok {
            flags |= FCF_SENS_IMU_A_OK;
        }
        if self.baro.ok {
            flags |= FCF_SENS_BMP1_OK;
        }
        if self.imu_b.ok {
            flags |= FCF_SENS_IMU_B_OK;
        }
        if tilt_ok {
            flags |= FCF_TILT_OK;
        }
        if self.tilt_latched {
            flags |= FCF_TILT_LATCH;
        }
        if self.mach_ok {
            flags |= FCF_MACH_OK;
        }
        if baro_agree {
            flags |= FCF_BARO_AGREE;
        }
        if liftoff_det {
            flags |= FCF_LIFTOFF_DET;
        }
        if burnout_det {
            flags |= FCF_BURNOUT_DET;
        }
        if fused.agl_ready {
            flags |= FCF_AGL_READY;
        }

        // ── FSM transitions ──────────────────────────────────────────────────
        if self.tilt_latched && !matches!(self.state, FcState::Locked | FcState::AbortLockout) {
            self.enter(FcState::AbortLockout, now_ms);
        } else {
            match self.state {
                FcState::Safe | FcState::Preflight => {
                    if liftoff_det {
                        self.enter(FcState::Boost, now_ms);
                    }
                }
                FcState::ArmedWait => {
                    // Reserved: unreachable from any transition (spec §9).
                }
                FcState::Boost => {
                    if burnout_det {
                        self.post_burn_hold_entry_ms = Some(now_ms);
                        self.enter(FcState::PostBurnHold, now_ms);
                    }
                }
                FcState::PostBurnHold => {
                    let entry = self.post_burn_hold_entry_ms.unwrap_or(now_ms);
                    if now_ms.wrapping_sub(entry) >= cfg.fc_burnout_hold_ms {
                        self.enter(FcState::Window, now_ms);
                    }
                }
                FcState::Window => {
                    let deploy_ready = fused.agl_fused.is_finite()
                        && fused.agl_fused >= cfg.fc_min_deploy_agl_m
                        && fused.apogee_agl_m.is_finite()
                        && fused.apogee_agl_m >= cfg.fc_target_apogee_agl_m + cfg.fc_apogee_high_margin_m
                        && self.imu_a.ok
                        && self.baro.ok
                        && tilt_ok
                        && self.mach_ok;
                    if deploy_ready {
                        self.enter(FcState::Deployed, now_ms);
                    }
                }
                FcState::Deployed => {
                    let t_since_launch_s = self
                        .t_launch_ms
                        .map(|t| now_ms.wrapping_sub(t) as f32 / 1000.0)
                        .unwrap_or(0.0);
                    let timed_out =
                        t_since_launch_s > cfg.fc_expected_tta_s * cfg.fc_expected_tta_scale_timeout;
                    let near_apogee =
                        fused.t_to_apogee_s.is_finite() && fused.t_to_apogee_s <= cfg.fc_retract_before_apogee_s;
                    if near_apogee || timed_out {
                        self.enter(FcState::Retracting, now_ms);
                    }
                }
                FcState::Retracting => {
                    self.enter(FcState::Locked, now_ms);
                }
                FcState::Locked | FcState::AbortLockout => {
                    // Absorbing.
                }
            }
        }

        // WINDOW's deploy-timeout path: if we never reach DEPLOYED but the
        // expected time-to-apogee has elapsed, the mission still needs to
        // retract/lock rather than linger in WINDOW forever (spec scenario S3).
        if matches!(self.state, FcState::Window) {
            let t_since_launch_s = self
                .t_launch_ms
                .map(|t| now_ms.wrapping_sub(t) as f32 / 1000.0)
                .unwrap_or(0.0);
            if t_since_launch_s > cfg.fc_expected_tta_s * cfg.fc_expected_tta_scale_timeout {
                self.enter(FcState::Retracting, now_ms);
            }
        }

        let airbrake_cmd_deg = if matches!(self.state, FcState::Deployed) {
            cfg.fc_deploy_cmd_deg
        } else {
            0.0
        };

        let t_since_launch_s = self
            .t_launch_ms
            .map(|t| now_ms.wrapping_sub(t) as f32 / 1000.0)
            .unwrap_or(0.0);

        FcStatus {
            state: self.state,
            flags,
            airbrake_cmd_deg,
            t_since_launch_s,
            t_to_apogee_s: fused.t_to_apogee_s,
            mach_conservative: fused.mach_conservative,
            tilt_deg: tilt,
        }
    }
}
