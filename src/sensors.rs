//! Sensor producer contract (spec §4.1).
//!
//! The core never performs bus I/O; it consumes whatever the platform's
//! concrete drivers hand it through this narrow trait boundary. Mirrors the
//! non-blocking "get latest" shape `state.rs`'s `BaroData`/`GpsData`/`RcData`
//! already establish, generalized into a trait so tests and the bench
//! binary can supply scripted producers instead of real bus drivers.

use crate::types::{BaroReading, ImuAReading, ImuBReading};

pub trait BaroProducer {
    fn latest(&mut self) -> BaroReading;
}

pub trait ImuAProducer {
    fn latest(&mut self) -> ImuAReading;
}

pub trait ImuBProducer {
    fn latest(&mut self) -> ImuBReading;
}

/// Deterministic stand-in producers for tests and the bench/demo binary —
/// the scope boundary's substitute for the bench-mode parameter-override
/// layer and the concrete device drivers, both out of scope here.
pub mod sim {
    use super::*;

    /// Replays a fixed sequence of readings, holding the last one once
    /// exhausted (mirrors "tolerates a missed refresh by using the prior
    /// value", spec §4.1).
    pub struct ScriptedBaro {
        script: &'static [BaroReading],
        idx: usize,
    }

    impl ScriptedBaro {
        pub fn new(script: &'static [BaroReading]) -> Self {
            Self { script, idx: 0 }
        }
    }

    impl BaroProducer for ScriptedBaro {
        fn latest(&mut self) -> BaroReading {
            let reading = self.script[self.idx.min(self.script.len() - 1)];
            if self.idx + 1 < self.script.len() {
                self.idx += 1;
            }
            reading
        }
    }

    pub struct ScriptedImuA {
        script: &'static [ImuAReading],
        idx: usize,
    }

    impl ScriptedImuA {
        pub fn new(script: &'static [ImuAReading]) -> Self {
            Self { script, idx: 0 }
        }
    }

    impl ImuAProducer for ScriptedImuA {
        fn latest(&mut self) -> ImuAReading {
            let reading = self.script[self.idx.min(self.script.len() - 1)];
            if self.idx + 1 < self.script.len() {
                self.idx += 1;
            }
            reading
        }
    }

    pub struct ScriptedImuB {
        script: &'static [ImuBReading],
        idx: usize,
    }

    impl ScriptedImuB {
        pub fn new(script: &'static [ImuBReading]) -> Self {
            Self { script, idx: 0 }
        }
    }

    impl ImuBProducer for ScriptedImuB {
        fn latest(&mut self) -> ImuBReading {
            let reading = self.script[self.idx.min(self.script.len() - 1)];
            if self.idx + 1 < self.script.len() {
                self.idx += 1;
            }
            reading
        }
    }

    /// Constant producer — always returns the same reading. Useful for
    /// bench scenarios that only need one subsystem scripted at a time.
    pub struct ConstantBaro(pub BaroReading);
    impl BaroProducer for ConstantBaro {
        fn latest(&mut self) -> BaroReading {
            self.0
        }
    }

    pub struct ConstantImuA(pub ImuAReading);
    impl ImuAProducer for ConstantImuA {
        fn latest(&mut self) -> ImuAReading {
            self.0
        }
    }

    pub struct ConstantImuB(pub ImuBReading);
    impl ImuBProducer for ConstantImuB {
        fn latest(&mut self) -> ImuBReading {
            self.0
        }
    }
}
