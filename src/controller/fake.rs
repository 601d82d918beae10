//! Demo controller sources

use std::collections::BTreeMap;

use super::ControllerSource;
use crate::error::Result;
use crate::hid::{Axis, HatDirection};

/// Sweeps every axis back and forth and toggles all buttons on each read
///
/// Useful to check a host end to end without hardware.
pub struct FakeController {
    button_count: usize,
    axes: Vec<Axis>,
    hat: bool,
    count: i32,
    direction: i32,
    buttons: Vec<bool>,
    hat_step: u8,
}

impl FakeController {
    pub fn new(button_count: usize, axes: Vec<Axis>, hat: bool) -> Self {
        Self {
            button_count,
            axes,
            hat,
            count: 0,
            direction: 1,
            buttons: vec![false; button_count],
            hat_step: 0,
        }
    }
}

impl ControllerSource for FakeController {
    fn defined_button_count(&self) -> usize {
        self.button_count
    }

    fn defined_axes(&self) -> Vec<Axis> {
        self.axes.clone()
    }

    fn defined_has_hat_switch(&self) -> bool {
        self.hat
    }

    fn read_axes(&mut self) -> Result<BTreeMap<Axis, i8>> {
        self.count += self.direction;
        if self.count > 127 {
            self.count = 0;
            self.direction = -1;
        } else if self.count < -127 {
            self.count = 0;
            self.direction = 1;
        }

        let value = self.count as i8;
        Ok(self.axes.iter().map(|axis| (*axis, value)).collect())
    }

    fn read_buttons(&mut self) -> Result<Vec<bool>> {
        for pressed in self.buttons.iter_mut() {
            *pressed = !*pressed;
        }
        Ok(self.buttons.clone())
    }

    fn read_hat(&mut self) -> Result<Option<HatDirection>> {
        if !self.hat {
            return Ok(None);
        }
        self.hat_step = (self.hat_step + 1) % 9;
        Ok(HatDirection::from_code(self.hat_step))
    }
}

/// Always reports the rest state
pub struct IdleController {
    button_count: usize,
    axes: Vec<Axis>,
    hat: bool,
}

impl IdleController {
    pub fn new(button_count: usize, axes: Vec<Axis>, hat: bool) -> Self {
        Self {
            button_count,
            axes,
            hat,
        }
    }
}

impl ControllerSource for IdleController {
    fn defined_button_count(&self) -> usize {
        self.button_count
    }

    fn defined_axes(&self) -> Vec<Axis> {
        self.axes.clone()
    }

    fn defined_has_hat_switch(&self) -> bool {
        self.hat
    }

    fn read_axes(&mut self) -> Result<BTreeMap<Axis, i8>> {
        Ok(self.axes.iter().map(|axis| (*axis, 0)).collect())
    }

    fn read_buttons(&mut self) -> Result<Vec<bool>> {
        Ok(vec![false; self.button_count])
    }

    fn read_hat(&mut self) -> Result<Option<HatDirection>> {
        Ok(self.hat.then_some(HatDirection::Centered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_sweeps_and_reverses() {
        let mut fake = FakeController::new(2, vec![Axis::X, Axis::Y], false);

        let first = fake.read_axes().unwrap();
        assert_eq!(first[&Axis::X], 1);
        assert_eq!(first[&Axis::Y], 1);

        for _ in 0..126 {
            fake.read_axes().unwrap();
        }
        assert_eq!(fake.read_axes().unwrap()[&Axis::X], 0);
        assert_eq!(fake.read_axes().unwrap()[&Axis::X], -1);
    }

    #[test]
    fn test_fake_toggles_buttons() {
        let mut fake = FakeController::new(3, vec![], false);
        assert_eq!(fake.read_buttons().unwrap(), vec![true, true, true]);
        assert_eq!(fake.read_buttons().unwrap(), vec![false, false, false]);
    }

    #[test]
    fn test_fake_hat_cycles() {
        let mut fake = FakeController::new(1, vec![], true);
        let codes: Vec<u8> = (0..9)
            .map(|_| fake.read_hat().unwrap().unwrap().code())
            .collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8, 0]);
    }

    #[test]
    fn test_idle_is_rest() {
        let mut idle = IdleController::new(4, vec![Axis::Z], true);
        assert_eq!(idle.read_buttons().unwrap(), vec![false; 4]);
        assert_eq!(idle.read_axes().unwrap()[&Axis::Z], 0);
        assert_eq!(idle.read_hat().unwrap(), Some(HatDirection::Centered));
    }
}
