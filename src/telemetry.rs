//! Telemetry wire record (spec §3, §4.4, §6).
//!
//! Fixed-layout, no-padding, host-endian-on-target encoding with an
//! optional trailing CRC-32. The CRC routine generalizes
//! `drivers::crsf::calc_crc8`'s bit-banged table-free approach from CRC-8
//! (poly 0xD5) to the reflected IEEE CRC-32 (poly 0xEDB88320) this wire
//! format calls for.

use crate::config::Config;
use crate::types::{BaroReading, FcStatus, FusedAlt, ImuAReading, ImuBReading};

pub const MAGIC: [u8; 2] = [0xAB, 0xCD];
pub const PACKET_TYPE_FULL: u8 = 0;

pub const PRESENT_BMP: u32 = 1 << 0;
pub const PRESENT_IMU1: u32 = 1 << 1;
pub const PRESENT_SYS: u32 = 1 << 2;
pub const PRESENT_CTRL: u32 = 1 << 3;
pub const PRESENT_IMU2: u32 = 1 << 4;

const HEADER_LEN: usize = 2 + 1 + 1 + 4 + 4 + 4;
const BMP_LEN: usize = 4 + 4 + 4 + 1;
const IMU_A_LEN: usize = 16 + 12 + 4 + 4 + 1;
const IMU_B_LEN: usize = 12 + 12 + 4 + 1;
const SYS_LEN: usize = 2 + 2 + 1 + 4 + 1 + 4 + 4;
const CTRL_LEN: usize = 4 + 4;
const FUSED_LEN: usize = 1 + 4 * 26;
const CRC_LEN: usize = 4;

/// Total on-wire size of a full record, including the trailing CRC-32 word
/// (present as `0` when CRC is disabled — the field still occupies the
/// slot, matching the spec's "0 when disabled").
pub const RECORD_LEN: usize =
    HEADER_LEN + BMP_LEN + IMU_A_LEN + IMU_B_LEN + SYS_LEN + CTRL_LEN + FUSED_LEN + CRC_LEN;

/// Reflected IEEE CRC-32 (polynomial 0xEDB88320, init 0xFFFFFFFF, final XOR
/// 0xFFFFFFFF), computed bit-by-bit with no lookup table — same style as
/// `drivers::crsf::calc_crc8`, generalized from 8 to 32 bits.
pub fn crc32_ieee_reflected(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc ^ 0xFFFF_FFFF
}

/// A composed telemetry snapshot, ready to encode to the wire (spec §6).
#[derive(Clone, Copy, Debug, Default)]
pub struct TelemetryRecord {
    pub seq: u32,
    pub timestamp_ms: u32,

    pub bmp: BaroReading,
    pub imu_a: ImuAReading,
    pub imu_b: ImuBReading,

    pub vbat_mv: u16,
    pub bus_error_count: u16,
    pub fc: FcStatus,

    pub airbrake_cmd_deg: f32,
    pub airbrake_actual_deg: f32,

    pub fused: FusedAlt,
}

impl TelemetryRecord {
    /// Build a fresh record from the owning snapshots (spec §4.4: "composes
    /// a fresh `TelemetryRecord` by copying current values"). There is no
    /// position feedback path, so `airbrake_actual_deg` always mirrors the
    /// commanded angle (spec §9 open question, resolved).
    pub fn compose(
        seq: u32,
        timestamp_ms: u32,
        bmp: BaroReading,
        imu_a: ImuAReading,
        imu_b: ImuBReading,
        vbat_mv: u16,
        bus_error_count: u16,
        fc: FcStatus,
        fused: FusedAlt,
    ) -> Self {
        Self {
            seq,
            timestamp_ms,
            bmp,
            imu_a,
            imu_b,
            vbat_mv,
            bus_error_count,
            fc,
            airbrake_cmd_deg: fc.airbrake_cmd_deg,
            airbrake_actual_deg: fc.airbrake_cmd_deg,
            fused,
        }
    }

    /// Encode into `buf`, which must be at least [`RECORD_LEN`] bytes.
    /// Returns the number of bytes written. CRC is computed over every byte
    /// preceding the CRC field and written last, or `0` when disabled.
    pub fn encode(&self, cfg: &Config, buf: &mut [u8]) -> usize {
        assert!(buf.len() >= RECORD_LEN);
        let mut w = Writer { buf, pos: 0 };

        w.bytes(&MAGIC);
        w.u8(PACKET_TYPE_FULL);
        w.u8(0); // _pad
        w.u32(self.seq);
        w.u32(self.timestamp_ms);
        w.u32(PRESENT_BMP | PRESENT_IMU1 | PRESENT_SYS | PRESENT_CTRL | PRESENT_IMU2);

        // bmp section
        w.f32(self.bmp.temperature_c);
        w.f32(self.bmp.pressure_pa);
        w.f32(self.bmp.altitude_m_msl);
        w.u8(self.bmp.valid as u8);

        // imu-a section
        for v in self.imu_a.quat_wxyz {
            w.f32(v);
        }
        for v in self.imu_a.accel_body_g {
            w.f32(v);
        }
        w.f32(self.imu_a.pressure_pa);
        w.f32(self.imu_a.altitude_m_msl);
        w.u8(self.imu_a.valid as u8);

        // imu-b section
        for v in self.imu_b.accel_body_g {
            w.f32(v);
        }
        for v in self.imu_b.gyro_dps {
            w.f32(v);
        }
        w.f32(self.imu_b.temp_c);
        w.u8(self.imu_b.valid as u8);

        // system section
        w.u16(self.vbat_mv);
        w.u16(self.bus_error_count);
        w.u8(self.fc.state as u8);
        w.u32(self.fc.flags);
        w.u8(self.fused.agl_ready as u8);
        w.f32(self.fc.t_since_launch_s);
        w.f32(self.fc.t_to_apogee_s);

        // control section
        w.f32(self.airbrake_cmd_deg);
        w.f32(self.airbrake_actual_deg);

        // fused section — every FusedAlt field except timestamp_ms, which is
        // always equal to the header's timestamp_ms and isn't re-sent.
        w.u8(self.fused.agl_ready as u8);
        w.f32(self.fused.bmp_alt);
        w.f32(self.fused.imu_alt);
        w.f32(self.fused.agl_bmp);
        w.f32(self.fused.agl_imu);
        w.f32(self.fused.agl_fused);
        w.f32(self.fused.vz_baro);
        w.f32(self.fused.vz_acc);
        w.f32(self.fused.vz_fused);
        w.f32(self.fused.az_earth);
        w.f32(self.fused.temp_c);
        w.f32(self.fused.press_hpa);
        w.f32(self.fused.sos_dynamic);
        w.f32(self.fused.sos_ground);
        w.f32(self.fused.sos_10kft);
        w.f32(self.fused.sos_min);
        w.f32(self.fused.mach_dynamic);
        w.f32(self.fused.mach_conservative);
        w.f32(self.fused.yaw);
        w.f32(self.fused.pitch);
        w.f32(self.fused.roll);
        w.f32(self.fused.tilt);
        w.f32(self.fused.tilt_az);
        w.f32(self.fused.tilt_az_360);
        w.f32(self.fused.tilt_az_unwrapped);
        w.f32(self.fused.t_to_apogee_s);
        w.f32(self.fused.apogee_agl_m);

        let crc = if cfg.telem_crc_enabled {
            crc32_ieee_reflected(&w.buf[..w.pos])
        } else {
            0
        };
        w.u32(crc);

        w.pos
    }

    /// Decode a record previously written by [`encode`](Self::encode).
    /// Returns `None` on a bad magic or (when CRC was enabled at encode
    /// time and the caller asks for verification) a CRC mismatch.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_LEN {
            return None;
        }
        let mut r = Reader { buf, pos: 0 };

        let magic = r.bytes(2);
        if magic[0] != MAGIC[0] || magic[1] != MAGIC[1] {
            return None;
        }
        let _packet_type = r.u8();
        let _pad = r.u8();
        let seq = r.u32();
        let timestamp_ms = r.u32();
        let _present_flags = r.u32();

        let bmp = BaroReading {
            temperature_c: r.f32(),
            pressure_pa: r.f32(),
            altitude_m_msl: r.f32(),
            valid: r.u8() != 0,
        };

        let imu_a = ImuAReading {
            quat_wxyz: [r.f32(), r.f32(), r.f32(), r.f32()],
            accel_body_g: [r.f32(), r.f32(), r.f32()],
            pressure_pa: r.f32(),
            altitude_m_msl: r.f32(),
            valid: r.u8() != 0,
        };

        let imu_b = ImuBReading {
            accel_body_g: [r.f32(), r.f32(), r.f32()],
            gyro_dps: [r.f32(), r.f32(), r.f32()],
            temp_c: r.f32(),
            valid: r.u8() != 0,
        };

        let vbat_mv = r.u16();
        let bus_error_count = r.u16();
        let fc_state_raw = r.u8();
        let fc_flags = r.u32();
        let agl_ready_mirror = r.u8() != 0;
        let t_since_launch_s = r.f32();
        let t_to_apogee_s = r.f32();

        let airbrake_cmd_deg = r.f32();
        let airbrake_actual_deg = r.f32();

        let agl_ready = r.u8() != 0;
        let bmp_alt = r.f32();
        let imu_alt = r.f32();
        let agl_bmp = r.f32();
        let agl_imu = r.f32();
        let agl_fused = r.f32();
        let vz_baro = r.f32();
        let vz_acc = r.f32();
        let vz_fused = r.f32();
        let az_earth = r.f32();
        let temp_c = r.f32();
        let press_hpa = r.f32();
        let sos_dynamic = r.f32();
        let sos_ground = r.f32();
        let sos_10kft = r.f32();
        let sos_min = r.f32();
        let mach_dynamic = r.f32();
        let mach_conservative = r.f32();
        let yaw = r.f32();
        let pitch = r.f32();
        let roll = r.f32();
        let tilt = r.f32();
        let tilt_az = r.f32();
        let tilt_az_360 = r.f32();
        let tilt_az_unwrapped = r.f32();
        let fused_t_to_apogee_s = r.f32();
        let apogee_agl_m = r.f32();

        let _crc = r.u32();

        let fc_state = fc_state_from_u8(fc_state_raw)?;
        let _ = agl_ready_mirror;

        Some(Self {
            seq,
            timestamp_ms,
            bmp,
            imu_a,
            imu_b,
            vbat_mv,
            bus_error_count,
            fc: FcStatus {
                state: fc_state,
                flags: fc_flags,
                airbrake_cmd_deg,
                t_since_launch_s,
                t_to_apogee_s,
                mach_conservative,
                tilt_deg: tilt,
            },
            airbrake_cmd_deg,
            airbrake_actual_deg,
            fused: FusedAlt {
                timestamp_ms,
                agl_ready,
                bmp_alt,
                imu_alt,
                agl_bmp,
                agl_imu,
                agl_fused,
                vz_baro,
                vz_acc,
                vz_fused,
                az_earth,
                temp_c,
                press_hpa,
                sos_dynamic,
                sos_ground,
                sos_10kft,
                sos_min,
                mach_dynamic,
                mach_conservative,
                yaw,
                pitch,
                roll,
                tilt,
                tilt_az,
                tilt_az_360,
                tilt_az_unwrapped,
                t_to_apogee_s: fused_t_to_apogee_s,
                apogee_agl_m,
            },
        })
    }

    /// Verify the trailing CRC-32 of an encoded buffer against a freshly
    /// recomputed one. `false` for CRC-disabled records (CRC field is `0`).
    pub fn verify_crc(buf: &[u8]) -> bool {
        if buf.len() < RECORD_LEN {
            return false;
        }
        let body = &buf[..RECORD_LEN - CRC_LEN];
        let stored = u32::from_le_bytes(buf[RECORD_LEN - CRC_LEN..RECORD_LEN].try_into().unwrap());
        if stored == 0 {
            return false;
        }
        crc32_ieee_reflected(body) == stored
    }
}

fn fc_state_from_u8(raw: u8) -> Option<crate::types::FcState> {
    use crate::types::FcState::*;
    Some(match raw {
        0 => Safe,
        1 => Preflight,
        2 => ArmedWait,
        3 => Boost,
        4 => PostBurnHold,
        5 => Window,
        6 => Deployed,
        7 => Retracting,
        8 => Locked,
        9 => AbortLockout,
        _ => return None,
    })
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn bytes(&mut self, b: &[u8]) {
        self.buf[self.pos..self.pos + b.len()].copy_from_slice(b);
        self.pos += b.len();
    }
    fn u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }
    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        slice
    }
    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }
    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.bytes(2).try_into().unwrap())
    }
    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.bytes(4).try_into().unwrap())
    }
    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.bytes(4).try_into().unwrap())
    }
}
