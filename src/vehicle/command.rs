//! MAVLink-style encoding of actuator intents.
//!
//! This is pure data: no transport, no timing. A link implementation sends
//! the produced messages; the simulator decodes them back to apply them.

use std::time::Duration;

use super::BodyVelocity;

pub const MAV_CMD_CONDITION_YAW: u16 = 115;
pub const MAV_CMD_DO_SET_SERVO: u16 = 183;
pub const MAV_FRAME_BODY_OFFSET_NED: u8 = 9;

/// Ignore position, acceleration and yaw fields; use velocity only.
pub const TYPE_MASK_VELOCITY_ONLY: u16 = 0b0000_1111_1100_0111;

/// Rate at which velocity setpoints are streamed while a command is held.
pub const SETPOINT_STREAM_HZ: u32 = 100;

/// Encoded outbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum VehicleMessage {
    CommandLong {
        command: u16,
        params: [f32; 7],
    },
    PositionTargetLocalNed {
        frame: u8,
        type_mask: u16,
        vx: f32,
        vy: f32,
        vz: f32,
    },
}

/// CONDITION_YAW to an absolute or relative heading, clockwise.
pub fn condition_yaw(heading_deg: f64, relative: bool) -> VehicleMessage {
    VehicleMessage::CommandLong {
        command: MAV_CMD_CONDITION_YAW,
        params: [
            heading_deg as f32,
            0.0,
            1.0,
            if relative { 1.0 } else { 0.0 },
            0.0,
            0.0,
            0.0,
        ],
    }
}

/// Body-frame velocity setpoint (forward = x, right = y, down = z).
pub fn body_velocity(velocity: BodyVelocity) -> VehicleMessage {
    VehicleMessage::PositionTargetLocalNed {
        frame: MAV_FRAME_BODY_OFFSET_NED,
        type_mask: TYPE_MASK_VELOCITY_ONLY,
        vx: velocity.forward as f32,
        vy: velocity.right as f32,
        vz: velocity.down as f32,
    }
}

pub fn set_servo(channel: u8, pwm: u16) -> VehicleMessage {
    VehicleMessage::CommandLong {
        command: MAV_CMD_DO_SET_SERVO,
        params: [channel as f32, pwm as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
    }
}

/// How many times a setpoint is sent to hold it for `duration`.
pub fn stream_repetitions(duration: Duration) -> u32 {
    (duration.as_secs_f64() * SETPOINT_STREAM_HZ as f64) as u32
}

/// Decoded intent, as a receiving autopilot would interpret a message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodedCommand {
    Yaw { heading_deg: f64, relative: bool },
    Velocity(BodyVelocity),
    Servo { channel: u8, pwm: u16 },
    Unsupported,
}

pub fn decode(message: &VehicleMessage) -> DecodedCommand {
    match message {
        VehicleMessage::CommandLong {
            command: MAV_CMD_CONDITION_YAW,
            params,
        } => DecodedCommand::Yaw {
            heading_deg: params[0] as f64,
            relative: params[3] != 0.0,
        },
        VehicleMessage::CommandLong {
            command: MAV_CMD_DO_SET_SERVO,
            params,
        } => DecodedCommand::Servo {
            channel: params[0] as u8,
            pwm: params[1] as u16,
        },
        VehicleMessage::PositionTargetLocalNed {
            frame: MAV_FRAME_BODY_OFFSET_NED,
            type_mask: TYPE_MASK_VELOCITY_ONLY,
            vx,
            vy,
            vz,
        } => DecodedCommand::Velocity(BodyVelocity {
            forward: *vx as f64,
            right: *vy as f64,
            down: *vz as f64,
        }),
        _ => DecodedCommand::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaw_command_flags_relative_heading() {
        match condition_yaw(90.0, true) {
            VehicleMessage::CommandLong { command, params } => {
                assert_eq!(command, MAV_CMD_CONDITION_YAW);
                assert_eq!(params[0], 90.0);
                assert_eq!(params[2], 1.0);
                assert_eq!(params[3], 1.0);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(
            decode(&condition_yaw(0.0, false)),
            DecodedCommand::Yaw {
                heading_deg: 0.0,
                relative: false
            }
        );
    }

    #[test]
    fn velocity_setpoint_uses_body_frame_and_velocity_mask() {
        let msg = body_velocity(BodyVelocity::horizontal(0.25, -0.5));
        match &msg {
            VehicleMessage::PositionTargetLocalNed {
                frame, type_mask, ..
            } => {
                assert_eq!(*frame, MAV_FRAME_BODY_OFFSET_NED);
                assert_eq!(*type_mask, 0x0FC7);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(
            decode(&msg),
            DecodedCommand::Velocity(BodyVelocity::horizontal(0.25, -0.5))
        );
    }

    #[test]
    fn servo_command_carries_channel_and_pwm() {
        assert_eq!(
            decode(&set_servo(6, 2000)),
            DecodedCommand::Servo {
                channel: 6,
                pwm: 2000
            }
        );
    }

    #[test]
    fn setpoints_stream_at_one_hundred_hz() {
        assert_eq!(stream_repetitions(Duration::from_millis(200)), 20);
        assert_eq!(stream_repetitions(Duration::from_secs(1)), 100);
        assert_eq!(stream_repetitions(Duration::ZERO), 0);
    }

    #[test]
    fn unknown_messages_are_unsupported() {
        let msg = VehicleMessage::CommandLong {
            command: 400,
            params: [0.0; 7],
        };
        assert_eq!(decode(&msg), DecodedCommand::Unsupported);
    }
}
