#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Ticker};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use goldhorn_airbrake::config::Config;
use goldhorn_airbrake::fc::FcContext;
use goldhorn_airbrake::fusion::FusionEngine;
use goldhorn_airbrake::sensors::sim::{ConstantBaro, ConstantImuA, ConstantImuB};
use goldhorn_airbrake::sensors::{BaroProducer, ImuAProducer, ImuBProducer};
use goldhorn_airbrake::servo::ServoController;
use goldhorn_airbrake::sync::{SoftResetFlag, TelemetrySink, TelemetryStore};
use goldhorn_airbrake::telemetry::TelemetryRecord;
use goldhorn_airbrake::types::{BaroReading, FusedAlt, ImuAReading, ImuBReading};

// ── Inter-task channels ──────────────────────────────────────────────────────
//  Cap=1: every consumer wants the LATEST sample; older values are dropped —
//  same "latest wins" convention as the DShot/baro/GPS channels this firmware
//  lineage already uses.
static BARO_CHAN: Channel<CriticalSectionRawMutex, BaroReading, 1> = Channel::new();
static IMU_A_CHAN: Channel<CriticalSectionRawMutex, ImuAReading, 1> = Channel::new();
static IMU_B_CHAN: Channel<CriticalSectionRawMutex, ImuBReading, 1> = Channel::new();
static FUSED_CHAN: Channel<CriticalSectionRawMutex, FusedAlt, 1> = Channel::new();
static FC_CHAN: Channel<CriticalSectionRawMutex, goldhorn_airbrake::types::FcStatus, 1> = Channel::new();

static SOFT_RESET: SoftResetFlag = SoftResetFlag::new();

/// Optional consumer-side queue of every published record, for a link that
/// wants the full history rather than just the latest snapshot (spec §4.4).
static TELEMETRY_SINK: TelemetrySink = TelemetrySink::new();

const TICK_HZ: u64 = 50;

#[embassy_executor::task]
async fn baro_task(mut producer: ConstantBaro) {
    let mut ticker = Ticker::every(Duration::from_hz(10));
    loop {
        let _ = BARO_CHAN.try_send(producer.latest());
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn imu_a_task(mut producer: ConstantImuA) {
    let mut ticker = Ticker::every(Duration::from_hz(50));
    loop {
        let _ = IMU_A_CHAN.try_send(producer.latest());
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn imu_b_task(mut producer: ConstantImuB) {
    let mut ticker = Ticker::every(Duration::from_hz(50));
    loop {
        let _ = IMU_B_CHAN.try_send(producer.latest());
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn fusion_task() {
    let cfg = Config::default();
    let mut engine = FusionEngine::new();
    let mut ticker = Ticker::every(Duration::from_hz(TICK_HZ));
    let mut now_ms: u32 = 0;
    let mut latest_baro = BaroReading::default();
    let mut latest_imu_a = ImuAReading::default();

    loop {
        if SOFT_RESET.take() {
            engine.soft_reset();
        }
        if let Ok(v) = BARO_CHAN.try_receive() {
            latest_baro = v;
        }
        if let Ok(v) = IMU_A_CHAN.try_receive() {
            latest_imu_a = v;
        }

        let fused = engine.tick(&cfg, now_ms, latest_baro, latest_imu_a);
        let _ = FUSED_CHAN.try_send(fused);

        now_ms = now_ms.wrapping_add((1000 / TICK_HZ) as u32);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn fc_task() {
    let cfg = Config::default();
    let mut fc = FcContext::new();
    let mut ticker = Ticker::every(Duration::from_hz(TICK_HZ));
    let mut now_ms: u32 = 0;
    let dt_ms = (1000 / TICK_HZ) as u32;

    let mut latest_baro = BaroReading::default();
    let mut latest_imu_a = ImuAReading::default();
    let mut latest_imu_b = ImuBReading::default();
    let mut latest_fused = FusedAlt::default();

    loop {
        if SOFT_RESET.take() {
            fc.soft_reset();
        }
        if let Ok(v) = BARO_CHAN.try_receive() {
            latest_baro = v;
        }
        if let Ok(v) = IMU_A_CHAN.try_receive() {
            latest_imu_a = v;
        }
        if let Ok(v) = IMU_B_CHAN.try_receive() {
            latest_imu_b = v;
        }
        if let Ok(v) = FUSED_CHAN.try_receive() {
            latest_fused = v;
        }

        let status = fc.tick(&cfg, dt_ms, now_ms, &latest_fused, &latest_baro, &latest_imu_a, &latest_imu_b);
        if status.state == goldhorn_airbrake::types::FcState::AbortLockout {
            defmt::warn!("fc: ABORT_LOCKOUT");
        }
        let _ = FC_CHAN.try_send(status);

        now_ms = now_ms.wrapping_add(dt_ms);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn telemetry_task(store: &'static TelemetryStore) {
    let mut ticker = Ticker::every(Duration::from_hz(TICK_HZ));
    let mut seq: u32 = 0;
    let mut now_ms: u32 = 0;
    let dt_ms = (1000 / TICK_HZ) as u32;

    let mut latest_baro = BaroReading::default();
    let mut latest_imu_a = ImuAReading::default();
    let mut latest_imu_b = ImuBReading::default();
    let mut latest_fused = FusedAlt::default();
    let mut latest_fc = goldhorn_airbrake::types::FcStatus::default();

    loop {
        if let Ok(v) = BARO_CHAN.try_receive() {
            latest_baro = v;
        }
        if let Ok(v) = IMU_A_CHAN.try_receive() {
            latest_imu_a = v;
        }
        if let Ok(v) = IMU_B_CHAN.try_receive() {
            latest_imu_b = v;
        }
        if let Ok(v) = FUSED_CHAN.try_receive() {
            latest_fused = v;
        }
        if let Ok(v) = FC_CHAN.try_receive() {
            latest_fc = v;
        }

        let record = TelemetryRecord::compose(
            seq,
            now_ms,
            latest_baro,
            latest_imu_a,
            latest_imu_b,
            7400,
            0,
            latest_fc,
            latest_fused,
        );
        store.publish(record).await;
        TELEMETRY_SINK.push(record);

        seq = seq.wrapping_add(1);
        now_ms = now_ms.wrapping_add(dt_ms);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn telemetry_sink_drain_task() {
    loop {
        let record = TELEMETRY_SINK.recv().await;
        defmt::trace!("telemetry: seq={} agl_m={}", record.seq, record.fused.agl_fused);
    }
}

#[embassy_executor::task]
async fn servo_task(store: &'static TelemetryStore) {
    let cfg = Config::default();
    let mut servo = ServoController::new();
    let mut ticker = Ticker::every(Duration::from_hz(TICK_HZ));

    loop {
        let record = store.get().await;
        let pulse_us = servo.tick(&cfg, &record);
        defmt::trace!("servo: open={} pulse_us={}", servo.is_open(), pulse_us);
        ticker.next().await;
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    static STORE: StaticCell<TelemetryStore> = StaticCell::new();
    let store: &'static TelemetryStore = STORE.init(TelemetryStore::new());

    spawner.spawn(baro_task(ConstantBaro(BaroReading {
        temperature_c: 15.0,
        pressure_pa: 101_325.0,
        altitude_m_msl: 0.0,
        valid: true,
    }))).unwrap();

    spawner.spawn(imu_a_task(ConstantImuA(ImuAReading {
        quat_wxyz: [1.0, 0.0, 0.0, 0.0],
        accel_body_g: [0.0, 0.0, 1.0],
        pressure_pa: 101_325.0,
        altitude_m_msl: 0.0,
        valid: true,
    }))).unwrap();

    spawner.spawn(imu_b_task(ConstantImuB(ImuBReading {
        accel_body_g: [0.0, 0.0, 1.0],
        gyro_dps: [0.0, 0.0, 0.0],
        temp_c: 20.0,
        valid: true,
    }))).unwrap();

    spawner.spawn(fusion_task()).unwrap();
    spawner.spawn(fc_task()).unwrap();
    spawner.spawn(telemetry_task(store)).unwrap();
    spawner.spawn(telemetry_sink_drain_task()).unwrap();
    spawner.spawn(servo_task(store)).unwrap();

    loop {
        embassy_time::Timer::after(Duration::from_millis(500)).await;
    }
}
