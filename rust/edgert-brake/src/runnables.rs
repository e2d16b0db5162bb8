//! Runnable bodies of the brake-by-wire node.
//!
//! All computations are synthetic but shaped like the real thing: the pedal
//! traces a press-and-release profile, the torque map scales it, the global
//! controller splits it front/rear, ABS limits slip per wheel and actuators
//! track their command. ABS and the controller burn a small amount of CPU to
//! emulate the compute load of the production algorithms.

use crate::wiring::{BrakeLabels, LABEL_SIZE, WHEELS};
use edgert::{burn_cycles, Channel, Runnable, RunnableCtx, RunnableSpec, RtError};
use tracing::{debug, trace, warn};

/// Peak demanded torque at full pedal travel, Nm.
const MAX_TOTAL_TORQUE_NM: f32 = 6000.0;

/// Front/rear torque split of the global controller.
const FRONT_SHARE: f32 = 0.3;
const REAR_SHARE: f32 = 0.2;

/// Torque reduction applied by ABS while slip is excessive.
const ABS_RELIEF: f32 = 0.7;

/// Pedal position sensor: a press-hold-release profile advancing one step
/// per job.
pub struct BrakePedal {
    step: u32,
}

impl BrakePedal {
    pub fn new() -> Self {
        Self { step: 0 }
    }
}

impl Runnable for BrakePedal {
    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        // 200-job cycle: ramp up, hold, ramp down, idle
        let phase = self.step % 200;
        let pos = match phase {
            0..=49 => phase as f32 / 50.0,
            50..=119 => 1.0,
            120..=169 => 1.0 - (phase - 120) as f32 / 50.0,
            _ => 0.0,
        };
        ctx.set_output_f32(0, pos);
        self.step += 1;
    }
}

/// Torque map: pedal position to total demanded torque, with a small
/// deadband against sensor noise.
pub struct BrakeTorqueMap;

impl Runnable for BrakeTorqueMap {
    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        let pedal = ctx.input_f32(0);
        let demand = if pedal < 0.02 {
            0.0
        } else {
            pedal * MAX_TOTAL_TORQUE_NM
        };
        ctx.set_output_f32(0, demand);
    }
}

/// Global brake controller: splits total torque across the four corners and
/// streams its demand to the telemetry channel when one is up.
pub struct GlobalBrakeController {
    telemetry: Option<Channel>,
    jobs: u64,
}

impl GlobalBrakeController {
    pub fn new() -> Self {
        Self {
            telemetry: None,
            jobs: 0,
        }
    }
}

impl Runnable for GlobalBrakeController {
    fn init(&mut self, _ctx: &mut RunnableCtx<'_>) {
        match Channel::connect("BrakeTelemetry") {
            Ok(mut channel) => {
                if channel.set_nonblocking(true).is_ok() {
                    self.telemetry = Some(channel);
                }
            }
            Err(RtError::NotFound(_)) => {
                debug!("telemetry channel absent, running without");
            }
            Err(e) => warn!(error = %e, "telemetry connect failed"),
        }
    }

    fn deinit(&mut self, _ctx: &mut RunnableCtx<'_>) {
        if let Some(channel) = self.telemetry.as_mut() {
            channel.cleanup();
        }
    }

    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        let total = ctx.input_f32(0);
        let front = total * FRONT_SHARE;
        let rear = total * REAR_SHARE;
        ctx.set_output_f32(0, front);
        ctx.set_output_f32(1, front);
        ctx.set_output_f32(2, rear);
        ctx.set_output_f32(3, rear);

        burn_cycles(100);

        self.jobs += 1;
        if self.jobs % 5 == 0 {
            if let Some(channel) = self.telemetry.as_mut() {
                match channel.send(&total.to_ne_bytes()) {
                    Ok(()) | Err(RtError::WouldBlock) => {}
                    Err(e) => {
                        warn!(error = %e, "telemetry send failed, dropping channel");
                        self.telemetry = None;
                    }
                }
            }
        }
    }
}

/// Per-wheel ABS stage: passes the torque demand through while slip is
/// acceptable, relieves it while the wheel model reports lock-up tendency.
pub struct AbsController {
    wheel: &'static str,
    wheel_speed: f32,
    vehicle_speed: f32,
}

impl AbsController {
    pub fn new(wheel: &'static str) -> Self {
        Self {
            wheel,
            wheel_speed: 30.0,
            vehicle_speed: 30.0,
        }
    }

    fn slip(&self) -> f32 {
        if self.vehicle_speed <= 0.1 {
            0.0
        } else {
            (self.vehicle_speed - self.wheel_speed) / self.vehicle_speed
        }
    }
}

impl Runnable for AbsController {
    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        let demand = ctx.input_f32(0);

        // Crude wheel/vehicle model: braking slows the wheel faster than the
        // vehicle; releasing lets it spin back up.
        self.vehicle_speed = (self.vehicle_speed - demand * 1e-5).max(0.0);
        self.wheel_speed = (self.wheel_speed - demand * 3e-5).max(0.0);
        if demand < 1.0 {
            self.wheel_speed = self.vehicle_speed;
        }

        let command = if self.slip() > 0.2 {
            trace!(wheel = self.wheel, slip = self.slip(), "slip relief active");
            demand * ABS_RELIEF
        } else {
            demand
        };
        ctx.set_output_f32(0, command);

        burn_cycles(150);
    }
}

/// Per-wheel actuator: first-order tracking of the commanded torque.
pub struct BrakeActuator {
    wheel: &'static str,
    applied_nm: f32,
}

impl BrakeActuator {
    pub fn new(wheel: &'static str) -> Self {
        Self {
            wheel,
            applied_nm: 0.0,
        }
    }
}

impl Runnable for BrakeActuator {
    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        let command = ctx.input_f32(0);
        self.applied_nm += (command - self.applied_nm) * 0.5;
        trace!(
            wheel = self.wheel,
            command_nm = command,
            applied_nm = self.applied_nm,
            "actuator update"
        );
    }

    fn deinit(&mut self, _ctx: &mut RunnableCtx<'_>) {
        debug!(wheel = self.wheel, applied_nm = self.applied_nm, "actuator released");
    }
}

/// Resolve a runnable name from the registration table to a wired spec.
pub fn resolve(labels: &BrakeLabels, name: &str) -> Option<RunnableSpec> {
    if let Some(wheel) = name.strip_prefix("abs_") {
        let idx = WHEELS.iter().position(|w| *w == wheel)?;
        return Some(
            RunnableSpec::new(AbsController::new(WHEELS[idx]))
                .with_input(labels.torque_cmd[idx], LABEL_SIZE)
                .with_output(labels.brake_cmd[idx], LABEL_SIZE),
        );
    }
    if let Some(wheel) = name.strip_prefix("actuator_") {
        let idx = WHEELS.iter().position(|w| *w == wheel)?;
        return Some(
            RunnableSpec::new(BrakeActuator::new(WHEELS[idx]))
                .with_input(labels.brake_cmd[idx], LABEL_SIZE),
        );
    }
    match name {
        "brake_pedal" => Some(
            RunnableSpec::new(BrakePedal::new()).with_output(labels.pedal_pos, LABEL_SIZE),
        ),
        "torque_map" => Some(
            RunnableSpec::new(BrakeTorqueMap)
                .with_input(labels.pedal_pos, LABEL_SIZE)
                .with_output(labels.torque_total, LABEL_SIZE),
        ),
        "brake_ctrl" => Some(
            RunnableSpec::new(GlobalBrakeController::new())
                .with_input(labels.torque_total, LABEL_SIZE)
                .with_output(labels.torque_cmd[0], LABEL_SIZE)
                .with_output(labels.torque_cmd[1], LABEL_SIZE)
                .with_output(labels.torque_cmd[2], LABEL_SIZE)
                .with_output(labels.torque_cmd[3], LABEL_SIZE),
        ),
        _ => None,
    }
}
