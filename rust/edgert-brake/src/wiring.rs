//! Label wiring for the brake-by-wire node.
//!
//! All shared variables are 4-byte host-order f32 values. Registration
//! happens once at boot, before the task table is consumed.

use edgert::{LabelId, LabelStore, RtResult};

/// Wheel corner order used for every per-wheel array in this crate.
pub const WHEELS: [&str; 4] = ["fl", "fr", "rl", "rr"];

/// Size of every label on this node.
pub const LABEL_SIZE: usize = 4;

/// The node's label set, resolved to ids at boot.
pub struct BrakeLabels {
    /// Normalised pedal position, 0.0..=1.0
    pub pedal_pos: LabelId,
    /// Total demanded brake torque in Nm
    pub torque_total: LabelId,
    /// Per-wheel torque demand from the global controller
    pub torque_cmd: [LabelId; 4],
    /// Per-wheel slip-limited actuator command
    pub brake_cmd: [LabelId; 4],
}

impl BrakeLabels {
    pub fn register(store: &LabelStore) -> RtResult<BrakeLabels> {
        let pedal_pos = store.register("pedal_pos", LABEL_SIZE)?;
        let torque_total = store.register("torque_total", LABEL_SIZE)?;

        let mut torque_cmd = [pedal_pos; 4];
        let mut brake_cmd = [pedal_pos; 4];
        for (i, wheel) in WHEELS.iter().enumerate() {
            torque_cmd[i] = store.register(&format!("torque_cmd_{}", wheel), LABEL_SIZE)?;
            brake_cmd[i] = store.register(&format!("brake_cmd_{}", wheel), LABEL_SIZE)?;
        }

        Ok(BrakeLabels {
            pedal_pos,
            torque_total,
            torque_cmd,
            brake_cmd,
        })
    }
}
