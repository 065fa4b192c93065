//! Subject input. Sources report raw axes; [`Sensitivity`] scales them the same way
//! for every device.

use crossbeam_channel::{Receiver, Sender, unbounded};
use gazex_core::Vec2;
use tracing::warn;

use crate::config::{InputConfig, InputDevice};

pub trait InputSource {
    /// Axes for this frame: x turns, y moves.
    fn read_axes(&mut self) -> Vec2;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullInput;

impl InputSource for NullInput {
    fn read_axes(&mut self) -> Vec2 {
        Vec2::zeros()
    }
}

/// Axes pushed from elsewhere, held until the next update.
#[derive(Debug)]
pub struct ChannelInput {
    updates: Receiver<Vec2>,
    axes: Vec2,
}

impl ChannelInput {
    pub fn new() -> (Self, Sender<Vec2>) {
        let (tx, rx) = unbounded();
        let input = Self {
            updates: rx,
            axes: Vec2::zeros(),
        };
        (input, tx)
    }
}

impl InputSource for ChannelInput {
    fn read_axes(&mut self) -> Vec2 {
        if let Some(latest) = self.updates.try_iter().last() {
            self.axes = latest;
        }
        self.axes
    }
}

pub struct Sensitivity<S> {
    source: S,
    turn_gain: f32,
    move_gain: f32,
}

impl<S: InputSource> Sensitivity<S> {
    pub fn new(source: S, config: &InputConfig) -> Self {
        Self {
            source,
            turn_gain: config.turn_sensitivity,
            move_gain: config.move_sensitivity,
        }
    }
}

impl<S: InputSource> InputSource for Sensitivity<S> {
    fn read_axes(&mut self) -> Vec2 {
        let raw = self.source.read_axes();
        Vec2::new(raw.x * self.turn_gain, raw.y * self.move_gain)
    }
}

/// Source for the configured device. Hardware devices have no driver in this build
/// and read as centred.
pub fn from_config(config: &InputConfig) -> Box<dyn InputSource> {
    if config.device != InputDevice::Null {
        warn!("{:?} input has no driver on this build, reading zero axes", config.device);
    }
    Box::new(Sensitivity::new(NullInput, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_are_scaled_per_direction() {
        let (source, tx) = ChannelInput::new();
        let config = InputConfig {
            turn_sensitivity: 2.0,
            move_sensitivity: 0.5,
            ..Default::default()
        };
        let mut input = Sensitivity::new(source, &config);
        assert_eq!(input.read_axes(), Vec2::zeros());
        tx.send(Vec2::new(0.25, 1.0)).unwrap();
        assert_eq!(input.read_axes(), Vec2::new(0.5, 0.5));
        // held until the next update
        assert_eq!(input.read_axes(), Vec2::new(0.5, 0.5));
    }

    #[test]
    fn unsupported_devices_read_zero() {
        let config = InputConfig {
            device: InputDevice::Gamepad,
            ..Default::default()
        };
        assert_eq!(from_config(&config).read_axes(), Vec2::zeros());
    }
}
