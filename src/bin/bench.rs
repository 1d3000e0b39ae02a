//! Bench/demo harness: replays a scripted flight profile through the pure
//! fusion/FC/telemetry/servo `tick()` functions and prints the visualizer
//! line every tick. Stands in for `src/bin/calibrate.rs`'s role as a
//! second, differently-purposed bin target — there it drove a 1-hour
//! Allan-variance logger over USB; here it drives an offline scenario
//! replay on the host, using `Config::bench()` (spec §9: "a bench-mode
//! preset is a second configuration profile, not a code fork").

use goldhorn_airbrake::config::Config;
use goldhorn_airbrake::fc::FcContext;
use goldhorn_airbrake::fusion::FusionEngine;
use goldhorn_airbrake::monitor::format_visualizer_line;
use goldhorn_airbrake::servo::ServoController;
use goldhorn_airbrake::telemetry::TelemetryRecord;
use goldhorn_airbrake::types::{BaroReading, ImuAReading, ImuBReading};

const DT_MS: u32 = 20;

/// Scripted approximation of spec §8 scenario S1 ("Clean nominal flight").
fn baro_at(t_s: f32) -> BaroReading {
    let agl = altitude_profile(t_s);
    BaroReading {
        temperature_c: 15.0,
        pressure_pa: 101_325.0,
        altitude_m_msl: 100.0 + agl,
        valid: true,
    }
}

fn imu_a_at(t_s: f32) -> ImuAReading {
    let agl = altitude_profile(t_s);
    ImuAReading {
        quat_wxyz: [1.0, 0.0, 0.0, 0.0],
        accel_body_g: [0.0, 0.0, accel_profile(t_s) / 9.80665 + 1.0],
        pressure_pa: 101_325.0,
        altitude_m_msl: 100.0 + agl,
        valid: true,
    }
}

fn accel_profile(t_s: f32) -> f32 {
    if t_s < 10.0 {
        0.0
    } else if t_s < 10.25 {
        40.0
    } else {
        0.0
    }
}

fn altitude_profile(t_s: f32) -> f32 {
    if t_s < 12.0 {
        0.0
    } else if t_s < 22.0 {
        let frac = (t_s - 12.0) / 10.0;
        800.0 + frac * (3200.0 - 800.0)
    } else {
        3200.0
    }
}

fn main() {
    let cfg = Config::bench();
    let mut fusion = FusionEngine::new();
    let mut fc = FcContext::new();
    let mut servo = ServoController::new();

    let mut now_ms: u32 = 0;
    let mut seq: u32 = 0;

    for _ in 0..(30_000 / DT_MS) {
        let t_s = now_ms as f32 / 1000.0;
        let baro = baro_at(t_s);
        let imu_a = imu_a_at(t_s);
        let imu_b = ImuBReading {
            accel_body_g: imu_a.accel_body_g,
            gyro_dps: [0.0, 0.0, 0.0],
            temp_c: 20.0,
            valid: true,
        };

        let fused = fusion.tick(&cfg, now_ms, baro, imu_a);
        let status = fc.tick(&cfg, DT_MS, now_ms, &fused, &baro, &imu_a, &imu_b);
        let record = TelemetryRecord::compose(seq, now_ms, baro, imu_a, imu_b, 7400, 0, status, fused);
        let pulse_us = servo.tick(&cfg, &record);

        if seq % 25 == 0 {
            println!("{} pulse_us:{}", format_visualizer_line(&record), pulse_us);
        }

        seq = seq.wrapping_add(1);
        now_ms = now_ms.wrapping_add(DT_MS);
    }
}
