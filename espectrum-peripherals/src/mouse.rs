/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The Kempston mouse.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

bitflags! {
    /// Flags for mouse buttons.
    /// * Bit = 1 button is pressed.
    /// * Bit = 0 button is released.
    #[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct MouseButtons: u8 {
        const LEFT    = 0b0000_0001;
        const RIGHT   = 0b0000_0010;
    }
}

const PORT_DECODE_MASK: u16 = 0x05FF;
const PORT_X:           u16 = 0x01DF;
const PORT_Y:           u16 = 0x05DF;
const PORT_BUTTONS:     u16 = 0x00DF;

/// The Kempston mouse interface.
///
/// Positions are 8-bit counters wrapping around in both directions.
/// The horizontal position is read when `address & 0x05FF == 0x01DF`, the vertical one
/// at `0x05DF` and buttons at `0x00DF`:
///
/// * bit 1 is 0 when the left button is being pressed.
/// * bit 0 is 0 when the right button is being pressed.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct KempstonMouse {
    x: u8,
    y: u8,
    #[cfg_attr(feature = "snapshot", serde(skip))]
    buttons: MouseButtons,
}

impl KempstonMouse {
    /// Applies a movement delta as reported by the pointing device.
    #[inline]
    pub fn move_mouse(&mut self, dx: i16, dy: i16) {
        self.x = self.x.wrapping_add(dx as u8);
        self.y = self.y.wrapping_add(dy as u8);
    }
    #[inline]
    pub fn set_buttons(&mut self, buttons: MouseButtons) {
        self.buttons = buttons;
    }
    #[inline]
    pub fn get_buttons(&self) -> MouseButtons {
        self.buttons
    }
    #[inline]
    pub fn position(&self) -> (u8, u8) {
        (self.x, self.y)
    }
    /// Returns the mouse data if `address` is decoded by the interface.
    pub fn port_read(&self, address: u16) -> Option<u8> {
        match address & PORT_DECODE_MASK {
            PORT_X => Some(self.x),
            PORT_Y => Some(self.y),
            PORT_BUTTONS => Some(
                0xFF & if self.buttons.contains(MouseButtons::LEFT) { 0xFD } else { 0xFF }
                     & if self.buttons.contains(MouseButtons::RIGHT) { 0xFE } else { 0xFF }
            ),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kempston_mouse_works() {
        let mut mouse = KempstonMouse::default();
        assert_eq!(mouse.port_read(0xFBDF), Some(0));
        assert_eq!(mouse.port_read(0xFFDF), Some(0));
        assert_eq!(mouse.port_read(0xFADF), Some(0xFF));
        assert_eq!(mouse.port_read(0x00FE), None);
        mouse.move_mouse(-3, 300);
        assert_eq!(mouse.position(), (253, 44));
        assert_eq!(mouse.port_read(0xFBDF), Some(253));
        assert_eq!(mouse.port_read(0xFFDF), Some(44));
        mouse.set_buttons(MouseButtons::LEFT);
        assert_eq!(mouse.port_read(0xFADF), Some(0xFD));
        mouse.set_buttons(MouseButtons::LEFT|MouseButtons::RIGHT);
        assert_eq!(mouse.port_read(0xFADF), Some(0xFC));
    }
}
