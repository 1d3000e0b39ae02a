//! Monitoring link: command parser and visualizer line formatter
//! (spec §4.6, §6).
//!
//! `CommandParser` generalizes `drivers::crsf::CrsfParser`'s push-byte /
//! accumulate / emit-on-terminator shape from a binary frame-sync pattern to
//! a newline-delimited ASCII line. `format_visualizer_line` follows
//! `tasks::telemetry_task`'s `write!`-into-`heapless::String` style for the
//! USB debug line.

use core::fmt::Write as _;

use heapless::String;

use crate::telemetry::TelemetryRecord;

const LINE_CAP: usize = 96;
const VIS_CAP: usize = 320;

/// A command recognized on the monitoring link (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SoftReset,
    HardReset,
}

/// Accumulates bytes until a newline, then attempts to recognize a command.
/// Unrecognized lines are silently discarded, mirroring `CrsfParser`'s
/// "drop and resync" behavior on a bad frame.
pub struct CommandParser {
    line: String<LINE_CAP>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self { line: String::new() }
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns `Some(command)` the instant a recognized line
    /// is terminated by `\n`.
    pub fn push_byte(&mut self, byte: u8) -> Option<Command> {
        if byte == b'\n' {
            let result = parse_line(self.line.trim_end_matches('\r'));
            self.line.clear();
            return result;
        }

        if byte != b'\r' {
            // Overlong line: drop silently and keep scanning for the next
            // terminator rather than panicking on a full buffer.
            if self.line.push(byte as char).is_err() {
                self.line.clear();
            }
        }
        None
    }

    /// Feed a byte slice, returning every command recognized within it. For
    /// `no_std` callers without an allocator, prefer [`push_byte`] in a loop
    /// and handle each `Some` as it arrives.
    pub fn push_bytes<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = Command> + 'a {
        bytes.iter().filter_map(move |&b| self.push_byte(b))
    }
}

fn parse_line(line: &str) -> Option<Command> {
    match line {
        "!cmd:soft_reset" => Some(Command::SoftReset),
        "!cmd:hard_reset" => Some(Command::HardReset),
        _ => None,
    }
}

/// Build the `key:value, key:value, …` visualizer status line (spec §6).
pub fn format_visualizer_line(rec: &TelemetryRecord) -> String<VIS_CAP> {
    let mut s: String<VIS_CAP> = String::new();
    let _ = write!(
        s,
        "ts_ms:{}, vbat_v:{:.2}, bus_err:{}, fc_state_str:{}, fc_state:{}, fc_flags:{:#x}, \
agl_ready:{}, imu_a_ok:{}, baro_ok:{}, imu_b_ok:{}, tilt_ok:{}, mach_ok:{}, \
t_launch_s:{:.2}, t_apogee_s:{:.2}, cmd_deg:{:.1}, act_deg:{:.1}, \
agl_m:{:.1}, vz_mps:{:.2}, tilt_deg:{:.1}, tilt_az_deg:{:.1}, mach_cons:{:.3}",
        rec.timestamp_ms,
        rec.vbat_mv as f32 / 1000.0,
        rec.bus_error_count,
        rec.fc.state.as_str(),
        rec.fc.state as u8,
        rec.fc.flags,
        rec.fused.agl_ready as u8,
        (rec.fc.flags & crate::types::fc_flags::FCF_SENS_IMU_A_OK != 0) as u8,
        (rec.fc.flags & crate::types::fc_flags::FCF_SENS_BMP1_OK != 0) as u8,
        (rec.fc.flags & crate::types::fc_flags::FCF_SENS_IMU_B_OK != 0) as u8,
        (rec.fc.flags & crate::types::fc_flags::FCF_TILT_OK != 0) as u8,
        (rec.fc.flags & crate::types::fc_flags::FCF_MACH_OK != 0) as u8,
        rec.fc.t_since_launch_s,
        rec.fc.t_to_apogee_s,
        rec.airbrake_cmd_deg,
        rec.airbrake_actual_deg,
        rec.fused.agl_fused,
        rec.fused.vz_fused,
        rec.fused.tilt,
        rec.fused.tilt_az_360,
        rec.fused.mach_conservative,
    );
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_soft_reset_command() {
        let mut parser = CommandParser::new();
        let mut got = None;
        for &b in b"!cmd:soft_reset\n" {
            if let Some(cmd) = parser.push_byte(b) {
                got = Some(cmd);
            }
        }
        assert_eq!(got, Some(Command::SoftReset));
    }

    #[test]
    fn recognizes_hard_reset_command() {
        let mut parser = CommandParser::new();
        let mut got = None;
        for &b in b"!cmd:hard_reset\n" {
            if let Some(cmd) = parser.push_byte(b) {
                got = Some(cmd);
            }
        }
        assert_eq!(got, Some(Command::HardReset));
    }

    #[test]
    fn ignores_unrecognized_lines() {
        let mut parser = CommandParser::new();
        let mut got = None;
        for &b in b"!cmd:unknown_thing\n" {
            if let Some(cmd) = parser.push_byte(b) {
                got = Some(cmd);
            }
        }
        assert_eq!(got, None);
    }

    #[test]
    fn handles_crlf_terminators() {
        let mut parser = CommandParser::new();
        let mut got = None;
        for &b in b"!cmd:soft_reset\r\n" {
            if let Some(cmd) = parser.push_byte(b) {
                got = Some(cmd);
            }
        }
        assert_eq!(got, Some(Command::SoftReset));
    }

    #[test]
    fn visualizer_line_contains_key_fields() {
        let rec = TelemetryRecord::default();
        let line = format_visualizer_line(&rec);
        assert!(line.contains("fc_state_str:"));
        assert!(line.contains("cmd_deg:"));
    }
}
