/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Kempston and Fuller joysticks.

bitflags! {
    /// Flags for reading and writing the current stick direction.
    /// * Bit = 1 a direction is active.
    /// * Bit = 0 a direction is inactive.
    #[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct Directions: u8 {
        const UP    = 0b0001;
        const RIGHT = 0b0010;
        const DOWN  = 0b0100;
        const LEFT  = 0b1000;
    }
}

/// An interface for providing user input data for a joystick.
pub trait JoystickInterface {
    /// Presses or releases the "fire" button.
    fn fire(&mut self, pressed: bool);
    /// Returns `true` if the "fire" button is being pressed.
    fn get_fire(&self) -> bool;
    /// Changes the stick direction.
    fn set_directions(&mut self, dir: Directions);
    fn get_directions(&self) -> Directions;
    /// Resets a joystick to the central (neutral) position.
    #[inline]
    fn center(&mut self) {
        self.set_directions(Directions::empty());
    }
    /// Returns the byte the joystick puts on the data bus when its port is read.
    fn port_read(&self) -> u8;
}

                      // 000F_UDLR
const KEMPSTON_FIRE:  u8 = 0b0001_0000;
const KEMPSTON_RIGHT: u8 = 0b0000_0001;
const KEMPSTON_LEFT:  u8 = 0b0000_0010;
const KEMPSTON_DOWN:  u8 = 0b0000_0100;
const KEMPSTON_UP:    u8 = 0b0000_1000;

                    // F---_RLDU
const FULLER_FIRE:   u8 = 0b1000_0000;
const FULLER_UNUSED: u8 = 0b0111_0000;
const FULLER_RIGHT:  u8 = 0b0000_1000;
const FULLER_LEFT:   u8 = 0b0000_0100;
const FULLER_DOWN:   u8 = 0b0000_0010;
const FULLER_UP:     u8 = 0b0000_0001;

/// The Kempston joystick, active high.
#[derive(Clone, Copy, Default, Debug)]
pub struct KempstonJoystick {
    data: u8,
    directions: Directions
}

/// The Fuller joystick, active low.
#[derive(Clone, Copy, Debug)]
pub struct FullerJoystick {
    data: u8,
    directions: Directions
}

/// Returns `true` if a read from `address` is decoded by the Kempston interface.
#[inline]
pub fn is_kempston_port(address: u16) -> bool {
    address & 0x00E0 == 0 || address & 0xFF == 0xDF
}

/// Returns `true` if a read from `address` is decoded by the Fuller interface.
#[inline]
pub fn is_fuller_port(address: u16) -> bool {
    address & 0xFF == 0x7F
}

impl Default for FullerJoystick {
    fn default() -> Self {
        FullerJoystick {
            data: !0,
            directions: Directions::empty()
        }
    }
}

impl JoystickInterface for KempstonJoystick {
    fn fire(&mut self, pressed: bool) {
        if pressed {
            self.data |= KEMPSTON_FIRE;
        }
        else {
            self.data &= !KEMPSTON_FIRE;
        }
    }

    fn get_fire(&self) -> bool {
        self.data & KEMPSTON_FIRE == KEMPSTON_FIRE
    }

    fn set_directions(&mut self, dir: Directions) {
        self.directions = dir;
        self.data = (self.data & KEMPSTON_FIRE) |
            if dir.intersects(Directions::UP)    { KEMPSTON_UP    } else { 0 } |
            if dir.intersects(Directions::RIGHT) { KEMPSTON_RIGHT } else { 0 } |
            if dir.intersects(Directions::DOWN)  { KEMPSTON_DOWN  } else { 0 } |
            if dir.intersects(Directions::LEFT)  { KEMPSTON_LEFT  } else { 0 };
    }

    fn get_directions(&self) -> Directions {
        self.directions
    }

    #[inline]
    fn port_read(&self) -> u8 {
        self.data
    }
}

impl JoystickInterface for FullerJoystick {
    fn fire(&mut self, pressed: bool) {
        if pressed {
            self.data &= !FULLER_FIRE;
        }
        else {
            self.data |= FULLER_FIRE;
        }
    }

    fn get_fire(&self) -> bool {
        self.data & FULLER_FIRE == 0
    }

    fn set_directions(&mut self, dir: Directions) {
        self.directions = dir;
        self.data = (self.data & (FULLER_FIRE|FULLER_UNUSED)) |
            if dir.intersects(Directions::UP)    { 0 } else { FULLER_UP    } |
            if dir.intersects(Directions::RIGHT) { 0 } else { FULLER_RIGHT } |
            if dir.intersects(Directions::DOWN)  { 0 } else { FULLER_DOWN  } |
            if dir.intersects(Directions::LEFT)  { 0 } else { FULLER_LEFT  };
    }

    fn get_directions(&self) -> Directions {
        self.directions
    }

    #[inline]
    fn port_read(&self) -> u8 {
        self.data
    }
}
