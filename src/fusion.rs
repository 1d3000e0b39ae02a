//! Fusion / derivation engine (spec §4.2).
//!
//! Runs once per tick at the telemetry cadence. Derives AGL, vertical speed,
//! vertical acceleration, tilt/azimuth, atmospherics and an apogee predictor
//! from the latest barometer and IMU-A readings. IMU-A's quaternion is taken
//! as ground truth — there is no independent attitude estimator here (no
//! full 6-DOF EKF, per spec non-goals); the quaternion math below is the
//! same body→earth rotation `drivers::ahrs::Mahony::rotate_vector` already
//! implements, just fed an externally-supplied quaternion instead of one
//! integrated in-place.

use micromath::F32Ext;

use crate::config::Config;
use crate::types::{BaroReading, FusedAlt, ImuAReading};

const LOCAL_G: f32 = 9.80665;
const GAMMA: f32 = 1.4;
const R_AIR: f32 = 287.05;
const KELVIN_OFFSET: f32 = 273.15;
const SOS_TEMP_FLOOR_K: f32 = 150.0;

/// Rotate a body-frame vector to earth frame by the given quaternion
/// (w, x, y, z), body→earth convention (spec §3, §4.2).
fn rotate_to_earth(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let (q0, q1, q2, q3) = (q[0], q[1], q[2], q[3]);
    let (x, y, z) = (v[0], v[1], v[2]);
    let n12 = q0 * q0;
    let n02 = q1 * q1;
    let n13 = q2 * q2;
    let n03 = q3 * q3;
    [
        x * (n12 + n02 - n13 - n03) + y * (2. * (q1 * q2 - q0 * q3)) + z * (2. * (q1 * q3 + q0 * q2)),
        x * (2. * (q1 * q2 + q0 * q3)) + y * (n12 - n02 + n13 - n03) + z * (2. * (q2 * q3 - q0 * q1)),
        x * (2. * (q1 * q3 - q0 * q2)) + y * (2. * (q2 * q3 + q0 * q1)) + z * (n12 - n02 - n13 + n03),
    ]
}

fn euler_from_quat(q: [f32; 4]) -> (f32, f32, f32) {
    let (q0, q1, q2, q3) = (q[0], q[1], q[2], q[3]);

    let sinr_cosp = 2.0 * (q0 * q1 + q2 * q3);
    let cosr_cosp = 1.0 - 2.0 * (q1 * q1 + q2 * q2);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = 2.0 * (q0 * q2 - q3 * q1);
    let pitch = if sinp.abs() >= 1.0 {
        core::f32::consts::FRAC_PI_2.copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny_cosp = 2.0 * (q0 * q3 + q1 * q2);
    let cosy_cosp = 1.0 - 2.0 * (q2 * q2 + q3 * q3);
    let yaw = siny_cosp.atan2(cosy_cosp);

    (roll, pitch, yaw)
}

/// Tilt between body +X and earth +Z, robust near vertical (spec §4.2).
fn tilt_deg(q: [f32; 4]) -> f32 {
    let rotated = rotate_to_earth(q, [1.0, 0.0, 0.0]);
    let z = rotated[2].clamp(-1.0, 1.0);
    z.acos().to_degrees()
}

/// Persistent fusion-engine state, cleared in full by [`FusionEngine::soft_reset`].
pub struct FusionEngine {
    warmup_start_ms: Option<u32>,
    agl_ready: bool,
    bmp_baseline: Option<f32>,
    imu_baseline: Option<f32>,

    vz_baro_primed: bool,
    vz_baro: f32,
    last_agl_fused: Option<f32>,
    last_tick_ms: Option<u32>,

    vz_acc: f32,

    az_hat: f32,
    ay_hat: f32,
    az_hat_initialised: bool,
    tilt_az_unwrapped: f32,
    tilt_az_prev_wrapped: Option<f32>,

    ground_sos: Option<f32>,
    sos_10kft: Option<f32>,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            warmup_start_ms: None,
            agl_ready: false,
            bmp_baseline: None,
            imu_baseline: None,
            vz_baro_primed: false,
            vz_baro: 0.0,
            last_agl_fused: None,
            last_tick_ms: None,
            vz_acc: 0.0,
            az_hat: 1.0,
            ay_hat: 0.0,
            az_hat_initialised: false,
            tilt_az_unwrapped: 0.0,
            tilt_az_prev_wrapped: None,
            ground_sos: None,
            sos_10kft: None,
        }
    }
}

impl FusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all filter state, baselines and unwrap accumulators. Edge
    /// triggered and atomic at the call site — the caller is expected to
    /// invoke this once at the top of a tick (spec §4.2 "Soft reset").
    pub fn soft_reset(&mut self) {
        *self = Self::default();
    }

    pub fn agl_ready(&self) -> bool {
        self.agl_ready
    }

    /// Recompute the entire `FusedAlt` snapshot from the latest readings.
    pub fn tick(&mut self, cfg: &Config, now_ms: u32, baro: BaroReading, imu_a: ImuAReading) -> FusedAlt {
        let mut out = FusedAlt {
            timestamp_ms: now_ms,
            ..FusedAlt::default()
        };

        // ── Δt ────────────────────────────────────────────────────────────
        let dt_s = match self.last_tick_ms {
            Some(prev) => {
                let raw_ms = now_ms.wrapping_sub(prev) as i32;
                let clamped_ms = raw_ms.max(1).min(cfg.fusion_vz_max_dt_ms as i32);
                clamped_ms as f32 / 1000.0
            }
            None => cfg.telem_period_ms as f32 / 1000.0,
        };
        self.last_tick_ms = Some(now_ms);

        // ── Warm-up / baseline capture ───────────────────────────────────
        if self.warmup_start_ms.is_none() {
            self.warmup_start_ms = Some(now_ms);
        }
        let warmup_elapsed = now_ms.wrapping_sub(self.warmup_start_ms.unwrap());
        let armed = warmup_elapsed >= cfg.zero_agl_after_ms;

        if armed {
            if self.bmp_baseline.is_none() && baro.valid {
                self.bmp_baseline = Some(baro.altitude_m_msl);
            }
            if self.imu_baseline.is_none() && imu_a.valid {
                self.imu_baseline = Some(imu_a.altitude_m_msl);
            }
            if !self.agl_ready && self.bmp_baseline.is_some() && self.imu_baseline.is_some() {
                self.agl_ready = true;
            }
        }
        out.agl_ready = self.agl_ready;

        // ── Raw / baselined altitudes ─────────────────────────────────────
        out.bmp_alt = if baro.valid { baro.altitude_m_msl } else { f32::NAN };
        out.imu_alt = if imu_a.valid { imu_a.altitude_m_msl } else { f32::NAN };

        out.agl_bmp = match self.bmp_baseline {
            Some(base) if baro.valid => baro.altitude_m_msl - base,
            _ => f32::NAN,
        };
        out.agl_imu = match self.imu_baseline {
            Some(base) if imu_a.valid => imu_a.altitude_m_msl - base,
            _ => f32::NAN,
        };

        // ── AGL fusion ──────────────────────────────────────────────────────
        out.agl_fused = match (out.agl_bmp.is_finite(), out.agl_imu.is_finite()) {
            (true, true) => cfg.fusion_w_bmp1 * out.agl_bmp + (1.0 - cfg.fusion_w_bmp1) * out.agl_imu,
            (true, false) => out.agl_bmp,
            (false, true) => out.agl_imu,
            (false, false) => f32::NAN,
        };

        // ── vz: barometric derivative ───────────────────────────────────────
        if out.agl_fused.is_finite() {
            match self.last_agl_fused {
                Some(prev) => {
                    let inst = (out.agl_fused - prev) / dt_s;
                    if self.vz_baro_primed {
                        self.vz_baro = cfg.fusion_vz_alpha * self.vz_baro + (1.0 - cfg.fusion_vz_alpha) * inst;
                    } else {
                        self.vz_baro = inst;
                        self.vz_baro_primed = true;
                    }
                }
                None => {
                    self.vz_baro = 0.0;
                }
            }
            self.last_agl_fused = Some(out.agl_fused);
        } else {
            self.last_agl_fused = None;
        }
        out.vz_baro = if self.vz_baro_primed { self.vz_baro } else { f32::NAN };

        // ── vz: acceleration integration ────────────────────────────────────
        if imu_a.valid {
            let accel_ms2 = [
                imu_a.accel_body_g[0] * LOCAL_G,
                imu_a.accel_body_g[1] * LOCAL_G,
                imu_a.accel_body_g[2] * LOCAL_G,
            ];
            let earth = rotate_to_earth(imu_a.quat_wxyz, accel_ms2);
            out.az_earth = earth[2] - LOCAL_G;
        } else {
            out.az_earth = f32::NAN;
        }

        if self.vz_baro_primed && out.az_earth.is_finite() {
            self.vz_acc = (1.0 - cfg.vz_leak_per_tick) * self.vz_acc + out.az_earth * dt_s;
        } else {
            self.vz_acc = 0.0;
        }
        out.vz_acc = self.vz_acc;

        // ── Complementary vz fusion ──────────────────────────────────────────
        out.vz_fused = match (out.vz_baro.is_finite(), out.vz_acc.is_finite()) {
            (true, true) => cfg.fusion_vz_fuse_beta * out.vz_baro + (1.0 - cfg.fusion_vz_fuse_beta) * out.vz_acc,
            (true, false) => out.vz_baro,
            (false, true) => out.vz_acc,
            (false, false) => f32::NAN,
        };

        // ── Attitude: Euler (display only), tilt, tilt azimuth ───────────────
        if imu_a.valid {
            let (roll, pitch, yaw) = euler_from_quat(imu_a.quat_wxyz);
            out.roll = roll.to_degrees();
            out.pitch = pitch.to_degrees();
            out.yaw = yaw.to_degrees();
            out.tilt = tilt_deg(imu_a.quat_wxyz);

            let rotated_x = rotate_to_earth(imu_a.quat_wxyz, [1.0, 0.0, 0.0]);
            let (hx, hy) = (rotated_x[0], rotated_x[1]);
            let horiz_mag = (hx * hx + hy * hy).sqrt();

            if out.tilt >= cfg.fusion_tilt_az_min_tilt_deg && horiz_mag > 1e-4 {
                let (nx, ny) = (hx / horiz_mag, hy / horiz_mag);
                if !self.az_hat_initialised {
                    self.az_hat = nx;
                    self.ay_hat = ny;
                    self.az_hat_initialised = true;
                } else {
                    let bx = cfg.fusion_tilt_az_alpha * self.az_hat + (1.0 - cfg.fusion_tilt_az_alpha) * nx;
                    let by = cfg.fusion_tilt_az_alpha * self.ay_hat + (1.0 - cfg.fusion_tilt_az_alpha) * ny;
                    let bmag = (bx * bx + by * by).sqrt();
                    if bmag > 1e-6 {
                        self.az_hat = bx / bmag;
                        self.ay_hat = by / bmag;
                    }
                }

                let angle_deg = self.ay_hat.atan2(self.az_hat).to_degrees();
                out.tilt_az = angle_deg;
                out.tilt_az_360 = if angle_deg < 0.0 { angle_deg + 360.0 } else { angle_deg };

                match self.tilt_az_prev_wrapped {
                    Some(prev_wrapped) => {
                        let mut delta = angle_deg - prev_wrapped;
                        while delta > 180.0 {
                            delta -= 360.0;
                        }
                        while delta <= -180.0 {
                            delta += 360.0;
                        }
                        self.tilt_az_unwrapped += delta;
                    }
                    None => {
                        self.tilt_az_unwrapped = angle_deg;
                    }
                }
                self.tilt_az_prev_wrapped = Some(angle_deg);
                out.tilt_az_unwrapped = self.tilt_az_unwrapped;
            } else {
                out.tilt_az = f32::NAN;
                out.tilt_az_360 = f32::NAN;
                out.tilt_az_unwrapped = if self.tilt_az_prev_wrapped.is_some() {
                    self.tilt_az_unwrapped
                } else {
                    f32::NAN
                };
            }
        }

        // ── Atmospherics ──────────────────────────────────────────────────────
        if baro.valid {
            out.temp_c = baro.temperature_c;
            out.press_hpa = baro.pressure_pa / 100.0;

            let t_k = (baro.temperature_c + KELVIN_OFFSET).max(SOS_TEMP_FLOOR_K);
            out.sos_dynamic = (GAMMA * R_AIR * t_k).sqrt();

            if self.ground_sos.is_none() {
                self.ground_sos = Some(out.sos_dynamic);
                let t_10kft_k = (t_k - cfg.sos_10kft_delta_k).max(SOS_TEMP_FLOOR_K);
                self.sos_10kft = Some((GAMMA * R_AIR * t_10kft_k).sqrt());
            }
        }
        out.sos_ground = self.ground_sos.unwrap_or(f32::NAN);
        out.sos_10kft = self.sos_10kft.unwrap_or(f32::NAN);
        out.sos_min = if out.sos_ground.is_finite() && out.sos_10kft.is_finite() {
            cfg.sos_min_floor_mps.max(out.sos_ground.min(out.sos_10kft))
        } else {
            f32::NAN
        };

        // ── Mach ──────────────────────────────────────────────────────────────
        if out.vz_fused.is_finite() && out.sos_min.is_finite() {
            out.mach_dynamic = out.vz_fused.abs() / out.sos_min;
            let cos_floor = cfg.tilt_max_deploy_deg.to_radians().cos().max(0.1);
            out.mach_conservative = (out.vz_fused.abs() / cos_floor) / out.sos_min;
        }

        // ── Apogee prediction ──────────────────────────────────────────────────
        if out.vz_fused.is_finite() && out.agl_fused.is_finite() {
            if out.vz_fused > 0.0 {
                out.t_to_apogee_s = cfg.fusion_safe_tapx_factor * out.vz_fused / LOCAL_G;
                out.apogee_agl_m =
                    out.agl_fused + cfg.fusion_safe_zapx_factor * out.vz_fused * out.vz_fused / (2.0 * LOCAL_G);
            } else {
                out.t_to_apogee_s = 0.0;
                out.apogee_agl_m = out.agl_fused;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baro(alt: f32, valid: bool) -> BaroReading {
        BaroReading {
            temperature_c: 15.0,
            pressure_pa: 101325.0,
            altitude_m_msl: alt,
            valid,
        }
    }

    fn imu_identity(alt: f32, accel_g: [f32; 3], valid: bool) -> ImuAReading {
        ImuAReading {
            quat_wxyz: [1.0, 0.0, 0.0, 0.0],
            accel_body_g: accel_g,
            pressure_pa: 101325.0,
            altitude_m_msl: alt,
            valid,
        }
    }

    #[test]
    fn agl_ready_monotone_and_baselines_immutable() {
        let cfg = Config::bench();
        let mut fe = FusionEngine::new();
        let mut t = 0u32;
        for _ in 0..200 {
            t += 20;
            let out = fe.tick(&cfg, t, baro(100.0, true), imu_identity(100.0, [0.0, 0.0, 1.0], true));
            if out.agl_ready {
                break;
            }
        }
        let snap1 = fe.tick(&cfg, t + 20, baro(105.0, true), imu_identity(105.0, [0.0, 0.0, 1.0], true));
        assert!(snap1.agl_ready);
        let baseline_bmp = fe.bmp_baseline;
        let snap2 = fe.tick(&cfg, t + 40, baro(110.0, true), imu_identity(110.0, [0.0, 0.0, 1.0], true));
        assert!(snap2.agl_ready);
        assert_eq!(fe.bmp_baseline, baseline_bmp);
    }

    #[test]
    fn tilt_is_zero_for_identity_quaternion() {
        let cfg = Config::default();
        let mut fe = FusionEngine::new();
        let out = fe.tick(&cfg, 0, baro(0.0, true), imu_identity(0.0, [0.0, 0.0, 1.0], true));
        assert!((out.tilt - 0.0).abs() < 1e-3);
    }

    #[test]
    fn tilt_is_ninety_for_sideways_quaternion() {
        // Rotate 90 degrees about Y: body +X maps to earth -Z (tilt=180) or
        // +Z depending on sign; use a quaternion with a known tilt instead:
        // rotate 90 deg about the earth Y axis so body +X -> earth horizontal.
        let half = (core::f32::consts::FRAC_PI_2 / 2.0).sin();
        let w = (core::f32::consts::FRAC_PI_2 / 2.0).cos();
        let q = [w, 0.0, half, 0.0];
        let cfg = Config::default();
        let mut fe = FusionEngine::new();
        let mut imu = imu_identity(0.0, [0.0, 0.0, 1.0], true);
        imu.quat_wxyz = q;
        let out = fe.tick(&cfg, 0, baro(0.0, true), imu);
        assert!((out.tilt - 90.0).abs() < 1.0);
    }

    #[test]
    fn mach_nan_unless_vz_and_sos_min_finite() {
        let cfg = Config::default();
        let mut fe = FusionEngine::new();
        let out = fe.tick(&cfg, 0, baro(0.0, false), imu_identity(0.0, [0.0, 0.0, 1.0], false));
        assert!(out.mach_conservative.is_nan());
    }

    #[test]
    fn descending_apogee_uses_current_agl() {
        let cfg = Config::default();
        let mut fe = FusionEngine::new();
        fe.warmup_start_ms = Some(0);
        fe.agl_ready = true;
        fe.bmp_baseline = Some(0.0);
        fe.imu_baseline = Some(0.0);
        fe.vz_baro_primed = true;
        fe.vz_baro = -10.0;
        fe.vz_acc = -10.0;
        fe.last_agl_fused = Some(800.0);
        fe.last_tick_ms = Some(0);
        let out = fe.tick(&cfg, 20, baro(799.8, true), imu_identity(799.8, [0.0, 0.0, 1.0], true));
        assert_eq!(out.t_to_apogee_s, 0.0);
        assert_eq!(out.apogee_agl_m, out.agl_fused);
    }

    #[test]
    fn soft_reset_clears_baselines_and_agl_ready() {
        let cfg = Config::bench();
        let mut fe = FusionEngine::new();
        let mut t = 0u32;
        loop {
            t += 20;
            let out = fe.tick(&cfg, t, baro(100.0, true), imu_identity(100.0, [0.0, 0.0, 1.0], true));
            if out.agl_ready {
                break;
            }
        }
        assert!(fe.agl_ready());
        fe.soft_reset();
        assert!(!fe.agl_ready());
        assert!(fe.bmp_baseline.is_none());
    }

    #[test]
    fn tilt_az_unwrapped_has_no_large_jump_across_wrap() {
        let cfg = Config::default();
        let mut fe = FusionEngine::new();
        // Sweep azimuth across the +/-180 wrap boundary in small steps while
        // holding tilt well above the azimuth-update threshold.
        let tilt_rad = 30f32.to_radians();
        let mut prev_unwrapped: Option<f32> = None;
        for i in 0..40 {
            let az_deg = 170.0 + (i as f32) * 1.0; // sweeps through 180/-180
            let az_rad = az_deg.to_radians();
            // Quaternion: tilt about an axis rotated by az_rad in the horizontal plane.
            let half_tilt = (tilt_rad / 2.0).sin();
            let w = (tilt_rad / 2.0).cos();
            let q = [w, half_tilt * az_rad.cos(), half_tilt * az_rad.sin(), 0.0];
            let mut imu = imu_identity(0.0, [0.0, 0.0, 1.0], true);
            imu.quat_wxyz = q;
            let out = fe.tick(&cfg, i * 20, baro(0.0, true), imu);
            if let Some(prev) = prev_unwrapped {
                if out.tilt_az_unwrapped.is_finite() {
                    assert!((out.tilt_az_unwrapped - prev).abs() <= 180.5);
                }
            }
            if out.tilt_az_unwrapped.is_finite() {
                prev_unwrapped = Some(out.tilt_az_unwrapped);
            }
        }
    }
}
