//! Single named configuration block (spec §6 / §9: "Build-time macros in the
//! source map to a single named configuration block... A bench-mode preset
//! is a second configuration profile, not a code fork.").

/// All tunable parameters for the fusion engine, FC gates, and telemetry
/// cadence. Defaults match the spec §6 table exactly.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    // ── Fusion: baseline / AGL ──────────────────────────────────────────
    pub zero_agl_after_ms: u32,
    pub fusion_w_bmp1: f32,

    // ── Fusion: vertical speed ───────────────────────────────────────────
    pub fusion_vz_alpha: f32,
    pub fusion_vz_max_dt_ms: u32,
    pub fusion_vz_fuse_beta: f32,
    pub vz_leak_per_tick: f32,

    // ── Fusion: tilt azimuth ─────────────────────────────────────────────
    pub fusion_tilt_az_alpha: f32,
    pub fusion_tilt_az_min_tilt_deg: f32,

    // ── Fusion: conservative apogee bias ─────────────────────────────────
    pub fusion_safe_tapx_factor: f32,
    pub fusion_safe_zapx_factor: f32,

    // ── Atmospherics / Mach ──────────────────────────────────────────────
    pub tilt_max_deploy_deg: f32,
    pub sos_10kft_delta_k: f32,
    pub sos_min_floor_mps: f32,

    // ── FC: sensor validity debounce ─────────────────────────────────────
    pub fc_sensor_invalid_ms: u32,
    pub fc_sensor_recovery_ms: u32,

    // ── FC: tilt abort ────────────────────────────────────────────────────
    pub fc_tilt_abort_deg: f32,
    pub fc_tilt_abort_dwell_ms: u32,

    // ── FC: conservative Mach gate ────────────────────────────────────────
    pub fc_mach_max_for_deploy: f32,
    pub fc_mach_hyst: f32,
    pub fc_mach_dwell_ms: u32,

    // ── FC: baro agreement gate ───────────────────────────────────────────
    pub fc_baro_agree_m: f32,
    pub fc_baro_agree_ms: u32,

    // ── FC: liftoff detection ─────────────────────────────────────────────
    pub fc_vz_liftoff_mps: f32,
    pub fc_az_liftoff_mps2: f32,
    pub fc_liftoff_min_agl_m: f32,
    pub fc_liftoff_dwell_ms: u32,

    // ── FC: burnout detection ─────────────────────────────────────────────
    pub fc_burnout_az_done_mps2: f32,
    pub fc_burnout_dwell_ms: u32,
    pub fc_burnout_hold_ms: u32,

    // ── FC: deploy window ──────────────────────────────────────────────────
    pub fc_min_deploy_agl_m: f32,
    pub fc_target_apogee_agl_m: f32,
    pub fc_apogee_high_margin_m: f32,

    // ── FC: retract / timeout ──────────────────────────────────────────────
    pub fc_retract_before_apogee_s: f32,
    pub fc_expected_tta_s: f32,
    pub fc_expected_tta_scale_timeout: f32,

    // ── FC: airbrake command ────────────────────────────────────────────────
    pub fc_deploy_cmd_deg: f32,

    // ── Servo ────────────────────────────────────────────────────────────────
    pub servo_pulse_closed_us: u16,
    pub servo_pulse_open_us: u16,
    pub servo_max_deploy_deg: f32,

    // ── Telemetry ────────────────────────────────────────────────────────────
    pub telem_period_ms: u32,
    pub telem_crc_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zero_agl_after_ms: 10_000,
            fusion_w_bmp1: 0.70,

            fusion_vz_alpha: 0.85,
            fusion_vz_max_dt_ms: 200,
            fusion_vz_fuse_beta: 0.20,
            vz_leak_per_tick: 0.02,

            fusion_tilt_az_alpha: 0.90,
            fusion_tilt_az_min_tilt_deg: 2.0,

            fusion_safe_tapx_factor: 0.7,
            fusion_safe_zapx_factor: 0.8,

            tilt_max_deploy_deg: 20.0,
            sos_10kft_delta_k: 19.8,
            sos_min_floor_mps: 300.0,

            fc_sensor_invalid_ms: 150,
            fc_sensor_recovery_ms: 1500,

            fc_tilt_abort_deg: 30.0,
            fc_tilt_abort_dwell_ms: 200,

            fc_mach_max_for_deploy: 0.50,
            fc_mach_hyst: 0.02,
            fc_mach_dwell_ms: 300,

            fc_baro_agree_m: 15.0,
            fc_baro_agree_ms: 500,

            fc_vz_liftoff_mps: 8.0,
            fc_az_liftoff_mps2: 15.0,
            fc_liftoff_min_agl_m: 5.0,
            fc_liftoff_dwell_ms: 150,

            fc_burnout_az_done_mps2: 1.0,
            fc_burnout_dwell_ms: 200,
            fc_burnout_hold_ms: 1500,

            fc_min_deploy_agl_m: 50.0,
            fc_target_apogee_agl_m: 3000.0,
            fc_apogee_high_margin_m: 93.0,

            fc_retract_before_apogee_s: 5.0,
            fc_expected_tta_s: 18.0,
            fc_expected_tta_scale_timeout: 1.2,

            fc_deploy_cmd_deg: 30.0,

            servo_pulse_closed_us: 1000,
            servo_pulse_open_us: 2000,
            servo_max_deploy_deg: 30.0,

            telem_period_ms: 20,
            telem_crc_enabled: true,
        }
    }
}

impl Config {
    /// Bench-mode profile: short warm-up and relaxed agreement windows so a
    /// full flight can be replayed on a bench in seconds. Same struct, same
    /// code paths — only the numbers change (spec §9).
    pub fn bench() -> Self {
        Self {
            zero_agl_after_ms: 500,
            fc_baro_agree_ms: 50,
            fc_liftoff_dwell_ms: 20,
            fc_burnout_dwell_ms: 20,
            fc_tilt_abort_dwell_ms: 20,
            fc_mach_dwell_ms: 20,
            fc_sensor_invalid_ms: 20,
            fc_sensor_recovery_ms: 100,
            ..Self::default()
        }
    }
}
