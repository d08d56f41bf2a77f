/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **MAP** custom keyboard layout parser.
//!
//! ```text
//! name: Spanish
//! desc: Spanish layout ; comments start with ';' or '/'
//! base=
//! {
//!   1C,VK_a
//! }
//! virtual=
//! {
//!   VK_a,0,0,1,0,VK_AT
//! }
//! special=
//! {
//!   0E,0,0,0,1,VK_BACKSLASH
//! }
//! ```
//!
//! The `base=`, `extend=` and `extendjoy=` sections map scan codes to virtual keys,
//! `virtual=` maps virtual keys with modifiers to other virtual keys and `special=` maps
//! scan codes with modifiers to virtual keys. The modifiers are in order: ctrl, left alt,
//! right alt and shift.
use core::fmt;
use std::io::{self, Read};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use nom::IResult;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1, hex_digit1, space0};
use nom::combinator::{all_consuming, map, map_res};
use nom::sequence::{delimited, preceded, tuple};

/// The default layout name.
pub const DEFAULT_NAME: &str = "custom";
/// The default layout description.
pub const DEFAULT_DESC: &str = "custom layout";

const VK_NAMES: &[&str] = &[
    "VK_NONE", "VK_SPACE",
    "VK_0", "VK_1", "VK_2", "VK_3", "VK_4", "VK_5", "VK_6", "VK_7", "VK_8", "VK_9",
    "VK_KP_0", "VK_KP_1", "VK_KP_2", "VK_KP_3", "VK_KP_4",
    "VK_KP_5", "VK_KP_6", "VK_KP_7", "VK_KP_8", "VK_KP_9",
    "VK_a", "VK_b", "VK_c", "VK_d", "VK_e", "VK_f", "VK_g", "VK_h", "VK_i", "VK_j", "VK_k", "VK_l", "VK_m",
    "VK_n", "VK_o", "VK_p", "VK_q", "VK_r", "VK_s", "VK_t", "VK_u", "VK_v", "VK_w", "VK_x", "VK_y", "VK_z",
    "VK_A", "VK_B", "VK_C", "VK_D", "VK_E", "VK_F", "VK_G", "VK_H", "VK_I", "VK_J", "VK_K", "VK_L", "VK_M",
    "VK_N", "VK_O", "VK_P", "VK_Q", "VK_R", "VK_S", "VK_T", "VK_U", "VK_V", "VK_W", "VK_X", "VK_Y", "VK_Z",
    "VK_GRAVEACCENT", "VK_ACUTEACCENT", "VK_QUOTE", "VK_QUOTEDBL", "VK_EQUALS", "VK_MINUS", "VK_KP_MINUS",
    "VK_PLUS", "VK_KP_PLUS", "VK_KP_MULTIPLY", "VK_ASTERISK", "VK_BACKSLASH", "VK_KP_DIVIDE", "VK_SLASH",
    "VK_KP_PERIOD", "VK_PERIOD", "VK_COLON", "VK_COMMA", "VK_SEMICOLON", "VK_AMPERSAND", "VK_VERTICALBAR",
    "VK_HASH", "VK_AT", "VK_CARET", "VK_DOLLAR", "VK_POUND", "VK_EURO", "VK_PERCENT", "VK_EXCLAIM",
    "VK_QUESTION", "VK_LEFTBRACE", "VK_RIGHTBRACE", "VK_LEFTBRACKET", "VK_RIGHTBRACKET", "VK_LEFTPAREN",
    "VK_RIGHTPAREN", "VK_LESS", "VK_GREATER", "VK_UNDERSCORE", "VK_DEGREE", "VK_SECTION", "VK_TILDE",
    "VK_NEGATION", "VK_LSHIFT", "VK_RSHIFT", "VK_LALT", "VK_RALT", "VK_LCTRL", "VK_RCTRL", "VK_LGUI",
    "VK_RGUI", "VK_ESCAPE", "VK_PRINTSCREEN", "VK_SYSREQ", "VK_INSERT", "VK_KP_INSERT", "VK_DELETE",
    "VK_KP_DELETE", "VK_BACKSPACE", "VK_HOME", "VK_KP_HOME", "VK_END", "VK_KP_END", "VK_PAUSE", "VK_BREAK",
    "VK_SCROLLLOCK", "VK_NUMLOCK", "VK_CAPSLOCK", "VK_TAB", "VK_RETURN", "VK_KP_ENTER", "VK_APPLICATION",
    "VK_PAGEUP", "VK_KP_PAGEUP", "VK_PAGEDOWN", "VK_KP_PAGEDOWN", "VK_UP", "VK_KP_UP", "VK_DOWN",
    "VK_KP_DOWN", "VK_LEFT", "VK_KP_LEFT", "VK_RIGHT", "VK_KP_RIGHT", "VK_KP_CENTER",
    "VK_F1", "VK_F2", "VK_F3", "VK_F4", "VK_F5", "VK_F6", "VK_F7", "VK_F8", "VK_F9", "VK_F10", "VK_F11", "VK_F12",
    "VK_GRAVE_a", "VK_GRAVE_e", "VK_ACUTE_e", "VK_GRAVE_i", "VK_GRAVE_o", "VK_GRAVE_u", "VK_CEDILLA_c",
    "VK_ESZETT", "VK_UMLAUT_u", "VK_UMLAUT_o", "VK_UMLAUT_a", "VK_CEDILLA_C", "VK_TILDE_n", "VK_TILDE_N",
    "VK_UPPER_a", "VK_ACUTE_a", "VK_ACUTE_i", "VK_ACUTE_o", "VK_ACUTE_u", "VK_UMLAUT_i", "VK_EXCLAIM_INV",
    "VK_QUESTION_INV", "VK_ACUTE_A", "VK_ACUTE_E", "VK_ACUTE_I", "VK_ACUTE_O", "VK_ACUTE_U",
    "VK_GRAVE_A", "VK_GRAVE_E", "VK_GRAVE_I", "VK_GRAVE_O", "VK_GRAVE_U", "VK_INTERPUNCT", "VK_DIAERESIS",
    "VK_UMLAUT_e", "VK_UMLAUT_A", "VK_UMLAUT_E", "VK_UMLAUT_I", "VK_UMLAUT_O", "VK_UMLAUT_U",
    "VK_CARET_a", "VK_CARET_e", "VK_CARET_i", "VK_CARET_o", "VK_CARET_u",
    "VK_CARET_A", "VK_CARET_E", "VK_CARET_I", "VK_CARET_O", "VK_CARET_U", "VK_ASCII"
];

/// A virtual key code, an index into the table of virtual key names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualKey(u16);

impl VirtualKey {
    pub const NONE: VirtualKey = VirtualKey(0);

    /// Resolves a virtual key name, unknown names resolve to [VirtualKey::NONE].
    pub fn from_name(name: &str) -> Self {
        VK_NAMES.iter().position(|&vk| vk == name)
                .map(|index| VirtualKey(index as u16))
                .unwrap_or(VirtualKey::NONE)
    }

    pub fn name(self) -> &'static str {
        VK_NAMES[self.0 as usize]
    }

    #[inline]
    pub fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Modifier keys required by a combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub lalt: bool,
    pub ralt: bool,
    pub shift: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScancodeToVk {
    pub scancode: u16,
    pub vk: VirtualKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AlternateVk {
    /// The virtual key pressed together with the modifiers.
    pub req_vk: VirtualKey,
    pub modifiers: Modifiers,
    pub vk: VirtualKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScancodeToVkCombo {
    pub scancode: u16,
    pub modifiers: Modifiers,
    pub vk: VirtualKey,
}

/// A custom keyboard layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keymap {
    pub name: String,
    pub desc: String,
    pub base: Vec<ScancodeToVk>,
    pub extend: Vec<ScancodeToVk>,
    pub extend_joy: Vec<ScancodeToVk>,
    pub alternate: Vec<AlternateVk>,
    pub special: Vec<ScancodeToVkCombo>,
}

impl Default for Keymap {
    fn default() -> Self {
        Keymap {
            name: DEFAULT_NAME.to_string(),
            desc: DEFAULT_DESC.to_string(),
            base: Vec::new(),
            extend: Vec::new(),
            extend_joy: Vec::new(),
            alternate: Vec::new(),
            special: Vec::new(),
        }
    }
}

/// The error returned when the whole keymap file is unusable.
#[derive(Debug)]
pub enum KeymapError {
    Io(io::Error),
    /// The file doesn't map a single key.
    NoMappings,
}

impl std::error::Error for KeymapError {}

impl fmt::Display for KeymapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeymapError::Io(err) => write!(f, "MAP: {}", err),
            KeymapError::NoMappings => f.write_str("MAP: no key mappings found"),
        }
    }
}

impl From<io::Error> for KeymapError {
    fn from(err: io::Error) -> Self {
        KeymapError::Io(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Base,
    Extend,
    ExtendJoy,
    Virtual,
    Special,
}

impl Section {
    fn from_header(line: &str) -> Option<Section> {
        Some(if line.starts_with("base=") { Section::Base }
        else if line.starts_with("extendjoy=") { Section::ExtendJoy }
        else if line.starts_with("extend=") { Section::Extend }
        else if line.starts_with("virtual=") { Section::Virtual }
        else if line.starts_with("special=") { Section::Special }
        else { return None })
    }
}

/// Strips a comment and surrounding white space.
fn strip_line(line: &str) -> &str {
    let end = line.find(|c| c == ';' || c == '/').unwrap_or(line.len());
    line[..end].trim()
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(space0, char(','), space0)(input)
}

fn scancode(input: &str) -> IResult<&str, u16> {
    map_res(hex_digit1, |hex: &str| u16::from_str_radix(hex, 16))(input)
}

fn vk_name(input: &str) -> IResult<&str, VirtualKey> {
    map(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'), VirtualKey::from_name)(input)
}

fn flag(input: &str) -> IResult<&str, bool> {
    map_res(digit1, |digits: &str| digits.parse::<u8>().map(|n| n != 0))(input)
}

fn modifiers(input: &str) -> IResult<&str, Modifiers> {
    map(tuple((flag, preceded(comma, flag), preceded(comma, flag), preceded(comma, flag))),
        |(ctrl, lalt, ralt, shift)| Modifiers { ctrl, lalt, ralt, shift })(input)
}

fn scancode_to_vk(input: &str) -> IResult<&str, ScancodeToVk> {
    all_consuming(map(tuple((scancode, preceded(comma, vk_name))),
        |(scancode, vk)| ScancodeToVk { scancode, vk }))(input)
}

fn alternate_vk(input: &str) -> IResult<&str, AlternateVk> {
    all_consuming(map(tuple((vk_name, preceded(comma, modifiers), preceded(comma, vk_name))),
        |(req_vk, modifiers, vk)| AlternateVk { req_vk, modifiers, vk }))(input)
}

fn scancode_to_vk_combo(input: &str) -> IResult<&str, ScancodeToVkCombo> {
    all_consuming(map(tuple((scancode, preceded(comma, modifiers), preceded(comma, vk_name))),
        |(scancode, modifiers, vk)| ScancodeToVkCombo { scancode, modifiers, vk }))(input)
}

/// Returns the trimmed value of a `<key>:` header line.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    Some(rest.trim_start().strip_prefix(':').unwrap_or("").trim())
}

impl Keymap {
    /// Parses the keymap file text.
    ///
    /// Malformed entries are skipped with a warning.
    pub fn parse(source: &str) -> Result<Self, KeymapError> {
        let mut keymap = Keymap::default();
        let mut section: Option<Section> = None;
        for (lineno, line) in source.lines().enumerate() {
            let line = strip_line(line);
            if line.is_empty() {
                continue;
            }
            let section_kind = match section {
                Some(section_kind) => section_kind,
                None => {
                    if let Some(name) = header_value(line, "name") {
                        if !name.is_empty() {
                            keymap.name = name.to_string();
                        }
                    }
                    else if let Some(desc) = header_value(line, "desc") {
                        if !desc.is_empty() {
                            keymap.desc = desc.to_string();
                        }
                    }
                    else if let Some(found) = Section::from_header(line) {
                        section = Some(found);
                    }
                    else {
                        warn!("MAP: line {}: unexpected: {:?}", lineno + 1, line);
                    }
                    continue;
                }
            };
            if line.starts_with('{') {
                continue;
            }
            if line.starts_with('}') {
                section = None;
                continue;
            }
            let parsed = match section_kind {
                Section::Base|Section::Extend|Section::ExtendJoy => {
                    scancode_to_vk(line).map(|(_, entry)| {
                        match section_kind {
                            Section::Base => keymap.base.push(entry),
                            Section::Extend => keymap.extend.push(entry),
                            _ => keymap.extend_joy.push(entry),
                        }
                    })
                }
                Section::Virtual => alternate_vk(line).map(|(_, entry)| keymap.alternate.push(entry)),
                Section::Special => scancode_to_vk_combo(line).map(|(_, entry)| keymap.special.push(entry)),
            };
            if parsed.is_err() {
                warn!("MAP: line {}: malformed {:?} entry: {:?}", lineno + 1, section_kind, line);
            }
        }
        if section.is_some() {
            warn!("MAP: the last section is not terminated");
        }
        if keymap.is_empty() {
            return Err(KeymapError::NoMappings)
        }
        debug!("MAP: loaded layout: {}", keymap.name);
        Ok(keymap)
    }

    /// Reads the whole keymap file from `rd` and parses it.
    pub fn read<R: Read>(mut rd: R) -> Result<Self, KeymapError> {
        let mut data = Vec::new();
        rd.read_to_end(&mut data)?;
        Keymap::parse(&String::from_utf8_lossy(&data))
    }

    /// Returns `true` if no key is being mapped.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.extend.is_empty() && self.extend_joy.is_empty()
        && self.alternate.is_empty() && self.special.is_empty()
    }
}
