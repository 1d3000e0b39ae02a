//! Integration tests driving the fusion engine and FC state machine
//! together tick-by-tick through the literal scenarios in spec §8.

use goldhorn_airbrake::config::Config;
use goldhorn_airbrake::fc::FcContext;
use goldhorn_airbrake::fusion::FusionEngine;
use goldhorn_airbrake::monitor::{Command, CommandParser};
use goldhorn_airbrake::telemetry::TelemetryRecord;
use goldhorn_airbrake::types::{BaroReading, FcState, ImuAReading, ImuBReading};

const DT_MS: u32 = 20;

fn imu_b_matching(imu_a: &ImuAReading) -> ImuBReading {
    ImuBReading {
        accel_body_g: imu_a.accel_body_g,
        gyro_dps: [0.0, 0.0, 0.0],
        temp_c: 20.0,
        valid: true,
    }
}

struct Harness {
    cfg: Config,
    fusion: FusionEngine,
    fc: FcContext,
    now_ms: u32,
}

impl Harness {
    fn new(cfg: Config) -> Self {
        Self {
            cfg,
            fusion: FusionEngine::new(),
            fc: FcContext::new(),
            now_ms: 0,
        }
    }

    fn step(&mut self, baro: BaroReading, imu_a: ImuAReading) -> (goldhorn_airbrake::types::FusedAlt, goldhorn_airbrake::types::FcStatus) {
        let imu_b = imu_b_matching(&imu_a);
        let fused = self.fusion.tick(&self.cfg, self.now_ms, baro, imu_a);
        let status = self.fc.tick(&self.cfg, DT_MS, self.now_ms, &fused, &baro, &imu_a, &imu_b);
        self.now_ms = self.now_ms.wrapping_add(DT_MS);
        (fused, status)
    }
}

fn identity_imu(accel_z_g: f32, alt: f32, valid: bool) -> ImuAReading {
    ImuAReading {
        quat_wxyz: [1.0, 0.0, 0.0, 0.0],
        accel_body_g: [0.0, 0.0, accel_z_g],
        pressure_pa: 101_325.0,
        altitude_m_msl: 100.0 + alt,
        valid,
    }
}

fn baro_reading(alt: f32, valid: bool) -> BaroReading {
    BaroReading {
        temperature_c: 15.0,
        pressure_pa: 101_325.0,
        altitude_m_msl: 100.0 + alt,
        valid,
    }
}

/// S1. Clean nominal flight: warm-up, liftoff pulse, burnout, ascent,
/// deploy once the biased apogee estimate clears the target, retract near
/// apogee, lock.
#[test]
fn s1_clean_nominal_flight_reaches_deployed_then_locked() {
    let mut h = Harness::new(Config::bench());
    let mut saw_boost = false;
    let mut saw_post_burn_hold = false;
    let mut saw_window = false;
    let mut saw_deployed = false;
    let mut cmd_nonzero_outside_deployed = false;

    // Warm up.
    for _ in 0..40 {
        let (_, status) = h.step(baro_reading(0.0, true), identity_imu(1.0, 0.0, true));
        if status.airbrake_cmd_deg > 0.0 && status.state != FcState::Deployed {
            cmd_nonzero_outside_deployed = true;
        }
    }

    // Liftoff pulse: az_earth ~ 40 m/s^2 (accel_body_g z = 1 + 40/g).
    for _ in 0..15 {
        let accel_g = 1.0 + 40.0 / 9.80665;
        let (_, status) = h.step(baro_reading(5.0, true), identity_imu(accel_g, 5.0, true));
        if status.state == FcState::Boost {
            saw_boost = true;
        }
    }

    // Burnout: az_earth back near 0.
    for _ in 0..15 {
        let (_, status) = h.step(baro_reading(50.0, true), identity_imu(1.0, 50.0, true));
        if status.state == FcState::PostBurnHold {
            saw_post_burn_hold = true;
        }
    }

    // Hold, then ascend toward a high apogee so the safety-biased predictor
    // clears the target comfortably.
    for i in 0..400 {
        let agl = 200.0 + i as f32 * 8.0;
        let (_, status) = h.step(baro_reading(agl, true), identity_imu(1.0, agl, true));
        if status.state == FcState::Window {
            saw_window = true;
        }
        if status.state == FcState::Deployed {
            saw_deployed = true;
        }
        if status.airbrake_cmd_deg > 0.0 && status.state != FcState::Deployed {
            cmd_nonzero_outside_deployed = true;
        }
    }

    assert!(saw_boost, "expected BOOST to be reached");
    assert!(saw_post_burn_hold, "expected POST_BURN_HOLD to be reached");
    assert!(saw_window, "expected WINDOW to be reached");
    assert!(saw_deployed, "expected DEPLOYED to be reached given a high enough trajectory");
    assert!(!cmd_nonzero_outside_deployed, "airbrake_cmd_deg > 0 must imply state == DEPLOYED");
}

/// S2. Tilt abort during boost: a sustained tilt excursion latches abort and
/// the command stays at zero thereafter.
#[test]
fn s2_tilt_abort_during_boost_locks_out_mission() {
    let mut h = Harness::new(Config::bench());

    for _ in 0..10 {
        let accel_g = 1.0 + 40.0 / 9.80665;
        h.step(baro_reading(5.0, true), identity_imu(accel_g, 5.0, true));
    }
    assert_eq!(h.fc.state(), FcState::Boost);

    // 45 degree tilt: rotate body +X toward earth horizontal/negative-Z mix.
    let half = (45f32.to_radians() / 2.0).sin();
    let w = (45f32.to_radians() / 2.0).cos();
    let tilted = ImuAReading {
        quat_wxyz: [w, 0.0, half, 0.0],
        accel_body_g: [0.0, 0.0, 1.0],
        pressure_pa: 101_325.0,
        altitude_m_msl: 105.0,
        valid: true,
    };
    for _ in 0..15 {
        h.step(baro_reading(5.0, true), tilted);
    }

    assert_eq!(h.fc.state(), FcState::AbortLockout);

    for _ in 0..50 {
        let (_, status) = h.step(baro_reading(100.0, true), identity_imu(1.0, 100.0, true));
        assert_eq!(status.airbrake_cmd_deg, 0.0);
        assert_eq!(status.state, FcState::AbortLockout);
    }
}

/// S3. Low-trajectory flight: WINDOW is reached but the biased apogee
/// estimate never clears the target-plus-margin gate, so the mission must
/// leave WINDOW via the expected-time-to-apogee timeout rather than linger
/// in it forever.
#[test]
fn s3_low_trajectory_flight_times_out_of_window_into_retracting_and_locked() {
    let mut h = Harness::new(Config::bench());
    let mut saw_window = false;
    let mut saw_retracting = false;
    let mut saw_locked = false;

    // Liftoff pulse.
    for _ in 0..15 {
        let accel_g = 1.0 + 40.0 / 9.80665;
        h.step(baro_reading(5.0, true), identity_imu(accel_g, 5.0, true));
    }
    assert_eq!(h.fc.state(), FcState::Boost);

    // Burnout.
    for _ in 0..15 {
        h.step(baro_reading(50.0, true), identity_imu(1.0, 50.0, true));
    }

    // Hold, then a shallow, low-altitude climb that never clears
    // target_apogee + high_margin (3093 m in Config::bench()), run long
    // enough to exceed the expected-time-to-apogee timeout
    // (fc_expected_tta_s * fc_expected_tta_scale_timeout = 18 * 1.2 = 21.6 s).
    for i in 0..1600 {
        let agl = 200.0 + i as f32 * 0.2;
        let (_, status) = h.step(baro_reading(agl, true), identity_imu(1.0, agl, true));
        match status.state {
            FcState::Window => saw_window = true,
            FcState::Retracting => saw_retracting = true,
            FcState::Locked => saw_locked = true,
            _ => {}
        }
    }

    assert!(saw_window, "expected WINDOW to be reached");
    assert!(saw_retracting, "expected the WINDOW timeout to move the FSM to RETRACTING");
    assert!(saw_locked, "expected RETRACTING to advance to LOCKED the next tick");
}

/// S4. Barometer loss mid-boost: the BMP1-OK flag drops after the invalid
/// debounce window and AGL falls back to the IMU-A baseline.
#[test]
fn s4_barometer_loss_clears_bmp_ok_flag_and_falls_back_to_imu_agl() {
    let mut h = Harness::new(Config::bench());

    for _ in 0..200 {
        h.step(baro_reading(0.0, true), identity_imu(1.0, 0.0, true));
    }

    let mut dropped = false;
    for _ in 0..30 {
        let (fused, status) = h.step(baro_reading(50.0, false), identity_imu(1.0, 50.0, true));
        if status.flags & goldhorn_airbrake::types::fc_flags::FCF_SENS_BMP1_OK == 0 {
            dropped = true;
            assert!(fused.agl_fused.is_finite());
            assert_eq!(fused.agl_fused, fused.agl_imu);
        }
    }
    assert!(dropped, "expected BMP1-OK to clear after sustained invalid baro reads");
}

/// S5. Soft reset mid-flight clears baselines, latches and returns the FSM
/// to PREFLIGHT with cmd_deg back at zero.
#[test]
fn s5_soft_reset_mid_flight_returns_to_preflight() {
    let mut h = Harness::new(Config::bench());

    for _ in 0..250 {
        let accel_g = 1.0 + 40.0 / 9.80665;
        h.step(baro_reading(300.0, true), identity_imu(accel_g, 300.0, true));
    }
    assert_ne!(h.fc.state(), FcState::Preflight);

    h.fusion.soft_reset();
    h.fc.soft_reset();

    assert!(!h.fusion.agl_ready());
    assert_eq!(h.fc.state(), FcState::Preflight);

    let (fused, status) = h.step(baro_reading(0.0, true), identity_imu(1.0, 0.0, true));
    assert!(!fused.agl_ready);
    assert_eq!(status.airbrake_cmd_deg, 0.0);
}

/// S6. CRC verification: flipping a byte in an encoded record must make
/// the recomputed CRC mismatch.
#[test]
fn s6_crc_mismatches_after_byte_flip() {
    let mut h = Harness::new(Config::default());
    let (fused, status) = h.step(baro_reading(10.0, true), identity_imu(1.0, 10.0, true));
    let imu_a = identity_imu(1.0, 10.0, true);
    let imu_b = imu_b_matching(&imu_a);
    let record = TelemetryRecord::compose(
        1,
        h.now_ms,
        baro_reading(10.0, true),
        imu_a,
        imu_b,
        7400,
        0,
        status,
        fused,
    );

    let mut buf = [0u8; goldhorn_airbrake::telemetry::RECORD_LEN];
    record.encode(&h.cfg, &mut buf);
    assert!(TelemetryRecord::verify_crc(&buf));

    buf[20] ^= 0x01;
    assert!(!TelemetryRecord::verify_crc(&buf));
}

/// Monitoring command surface: `!cmd:soft_reset` is recognized end to end
/// through the byte parser.
#[test]
fn command_parser_recognizes_soft_reset_over_a_byte_stream() {
    let mut parser = CommandParser::new();
    let mut recognized = None;
    for &b in b"noise\n!cmd:soft_reset\n" {
        if let Some(cmd) = parser.push_byte(b) {
            recognized = Some(cmd);
        }
    }
    assert_eq!(recognized, Some(Command::SoftReset));
}
