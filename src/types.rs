//! Shared data-model types for the fusion engine, FC state machine, telemetry
//! aggregator and servo controller.
//!
//! All types are `Copy` to minimise overhead when passed between tasks and
//! copied out from under a lock — the same convention `state.rs` used for
//! `BaroData`/`GpsData`/`RcData`.

/// Reading from the external barometer (spec §3, "Reading — barometer").
#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct BaroReading {
    pub temperature_c: f32,
    pub pressure_pa: f32,
    pub altitude_m_msl: f32,
    pub valid: bool,
}

/// Reading from IMU-A: quaternion attitude (body→earth) plus internal baro.
/// The quaternion is the authoritative attitude source for the whole core —
/// there is no independent attitude estimator.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct ImuAReading {
    pub quat_wxyz: [f32; 4],
    pub accel_body_g: [f32; 3],
    pub pressure_pa: f32,
    pub altitude_m_msl: f32,
    pub valid: bool,
}

impl Default for ImuAReading {
    fn default() -> Self {
        Self {
            quat_wxyz: [1.0, 0.0, 0.0, 0.0],
            accel_body_g: [0.0, 0.0, 0.0],
            pressure_pa: 0.0,
            altitude_m_msl: 0.0,
            valid: false,
        }
    }
}

/// Reading from IMU-B: raw accel/gyro, already rotated into the body frame.
#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct ImuBReading {
    pub accel_body_g: [f32; 3],
    pub gyro_dps: [f32; 3],
    pub temp_c: f32,
    pub valid: bool,
}

/// Fused altitude / attitude / atmospherics snapshot, recomputed every tick
/// by the fusion engine (spec §3, "FusedAlt snapshot").
///
/// All floats are IEEE-754 single precision; NaN is the explicit "unknown"
/// sentinel and is propagated, never coerced to zero.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct FusedAlt {
    pub timestamp_ms: u32,
    pub agl_ready: bool,

    pub bmp_alt: f32,
    pub imu_alt: f32,
    pub agl_bmp: f32,
    pub agl_imu: f32,
    pub agl_fused: f32,

    pub vz_baro: f32,
    pub vz_acc: f32,
    pub vz_fused: f32,
    pub az_earth: f32,

    pub temp_c: f32,
    pub press_hpa: f32,
    pub sos_dynamic: f32,
    pub sos_ground: f32,
    pub sos_10kft: f32,
    pub sos_min: f32,
    pub mach_dynamic: f32,
    pub mach_conservative: f32,

    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub tilt: f32,
    pub tilt_az: f32,
    pub tilt_az_360: f32,
    pub tilt_az_unwrapped: f32,

    pub t_to_apogee_s: f32,
    pub apogee_agl_m: f32,
}

impl Default for FusedAlt {
    /// Every derived quantity starts as NaN ("unknown") except the booleans
    /// and timestamp, consistent with spec §7's NaN-as-sentinel policy.
    fn default() -> Self {
        let nan = f32::NAN;
        Self {
            timestamp_ms: 0,
            agl_ready: false,
            bmp_alt: nan,
            imu_alt: nan,
            agl_bmp: nan,
            agl_imu: nan,
            agl_fused: nan,
            vz_baro: nan,
            vz_acc: 0.0,
            vz_fused: nan,
            az_earth: nan,
            temp_c: nan,
            press_hpa: nan,
            sos_dynamic: nan,
            sos_ground: nan,
            sos_10kft: nan,
            sos_min: nan,
            mach_dynamic: nan,
            mach_conservative: nan,
            yaw: nan,
            pitch: nan,
            roll: nan,
            tilt: nan,
            tilt_az: nan,
            tilt_az_360: nan,
            tilt_az_unwrapped: nan,
            t_to_apogee_s: nan,
            apogee_agl_m: nan,
        }
    }
}

/// Mission flight-controller state (spec §4.3 FSM table).
///
/// Order matters: discriminants increase with mission progress so
/// `state as u8` gives a monotone "progress" ordinal, except for the
/// absorbing `AbortLockout` escape hatch (spec invariant 6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum FcState {
    Safe = 0,
    Preflight = 1,
    /// Reserved: enumerated in the source FSM but unreachable from any
    /// transition (spec §9 open question) — preserved as a reserved label.
    ArmedWait = 2,
    Boost = 3,
    PostBurnHold = 4,
    Window = 5,
    Deployed = 6,
    Retracting = 7,
    Locked = 8,
    AbortLockout = 9,
}

impl Default for FcState {
    fn default() -> Self {
        FcState::Preflight
    }
}

impl FcState {
    pub fn as_str(self) -> &'static str {
        match self {
            FcState::Safe => "SAFE",
            FcState::Preflight => "PREFLIGHT",
            FcState::ArmedWait => "ARMED_WAIT",
            FcState::Boost => "BOOST",
            FcState::PostBurnHold => "POST_BURN_HOLD",
            FcState::Window => "WINDOW",
            FcState::Deployed => "DEPLOYED",
            FcState::Retracting => "RETRACTING",
            FcState::Locked => "LOCKED",
            FcState::AbortLockout => "ABORT_LOCKOUT",
        }
    }
}

/// FC status flag bits (spec §3 `FcStatus.flags`). Hand-rolled as plain
/// `const`s rather than pulling in a bitflags-style macro crate, matching
/// the teacher's preference for flat dependency-free primitives in the
/// `no_std` core.
pub mod fc_flags {
    pub const FCF_SENS_IMU_A_OK: u32 = 1 << 0;
    pub const FCF_SENS_BMP1_OK: u32 = 1 << 1;
    pub const FCF_SENS_IMU_B_OK: u32 = 1 << 2;
    pub const FCF_TILT_OK: u32 = 1 << 3;
    pub const FCF_TILT_LATCH: u32 = 1 << 4;
    pub const FCF_MACH_OK: u32 = 1 << 5;
    pub const FCF_BARO_AGREE: u32 = 1 << 6;
    pub const FCF_LIFTOFF_DET: u32 = 1 << 7;
    pub const FCF_BURNOUT_DET: u32 = 1 << 8;
    pub const FCF_AGL_READY: u32 = 1 << 9;
}

/// FC status snapshot (spec §3 `FcStatus snapshot`).
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct FcStatus {
    pub state: FcState,
    pub flags: u32,
    pub airbrake_cmd_deg: f32,
    pub t_since_launch_s: f32,
    pub t_to_apogee_s: f32,
    pub mach_conservative: f32,
    pub tilt_deg: f32,
}

impl Default for FcStatus {
    fn default() -> Self {
        Self {
            state: FcState::Preflight,
            flags: 0,
            airbrake_cmd_deg: 0.0,
            t_since_launch_s: 0.0,
            t_to_apogee_s: f32::NAN,
            mach_conservative: f32::NAN,
            tilt_deg: f32::NAN,
        }
    }
}
