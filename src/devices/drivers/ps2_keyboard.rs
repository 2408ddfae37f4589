//! # PS/2 Keyboard Decoder
//!
//! Turns set-1 scancodes read from port 0x60 into characters.
//!
//! ## Scancode Processing
//!
//! 1. 0xE0 prefixes an extended key; the following byte is dropped since
//!    none of those keys produce a character
//! 2. Bit 7 marks a key release
//! 3. Shift and Ctrl are tracked across calls; Caps Lock toggles on press
//! 4. Everything else maps through the plain or shifted table
//!
//! ## Usage
//!
//! ```ignore
//! let scancode = unsafe { Port::<u8>::new(0x60).read() };
//! if let Some(event) = decoder.process_scancode(scancode) {
//!     // Handle key event
//! }
//! ```

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE: u8 = 0x80;

const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const ALT: u8 = 0x38;
const CAPS_LOCK: u8 = 0x3A;

/// Scancodes 0x00..0x3A, unshifted. Zero means no character.
static NORMAL_MAP: [u8; 0x3A] = *b"\0\x1B1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";

static SHIFT_MAP: [u8; 0x3A] = *b"\0\x1B!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    caps_lock: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            caps_lock: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }
        if self.is_extended {
            self.is_extended = false;
            return None;
        }

        let is_release = scancode & RELEASE != 0;
        let key_code = scancode & !RELEASE;

        match key_code {
            LSHIFT | RSHIFT => {
                self.shift_pressed = !is_release;
                return None;
            }
            CTRL => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            ALT => return None,
            CAPS_LOCK => {
                if !is_release {
                    self.caps_lock = !self.caps_lock;
                }
                return None;
            }
            _ => {}
        }

        if is_release {
            return None;
        }

        let map = if self.shift_pressed { &SHIFT_MAP } else { &NORMAL_MAP };
        let mut c = *map.get(usize::from(key_code))?;
        if c == 0 {
            return None;
        }
        if self.caps_lock && c.is_ascii_alphabetic() {
            c ^= 0x20;
        }

        Some(KeyEvent {
            character: char::from(c),
            ctrl: self.ctrl_pressed,
            shift: self.shift_pressed,
        })
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub character: char,
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyEvent {
    /// The byte a terminal would see: Ctrl folds letters onto 0x01..0x1A.
    pub fn as_byte(&self) -> Option<u8> {
        let c = u8::try_from(self.character).ok()?;
        if self.ctrl && c.is_ascii_alphabetic() {
            return Some(c.to_ascii_lowercase() - b'a' + 1);
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut ScancodeDecoder, codes: &[u8]) -> Vec<u8> {
        codes
            .iter()
            .filter_map(|&sc| decoder.process_scancode(sc))
            .filter_map(|key| key.as_byte())
            .collect()
    }

    #[test]
    fn test_plain_keys_ignore_release() {
        let mut decoder = ScancodeDecoder::new();
        // h, i, Enter with their releases
        let bytes = feed(&mut decoder, &[0x23, 0xA3, 0x17, 0x97, 0x1C, 0x9C]);
        assert_eq!(bytes, b"hi\n");
    }

    #[test]
    fn test_shift_is_held_until_release() {
        let mut decoder = ScancodeDecoder::new();
        let bytes = feed(&mut decoder, &[LSHIFT, 0x1E, 0x02, LSHIFT | RELEASE, 0x1E]);
        assert_eq!(bytes, b"A!a");
    }

    #[test]
    fn test_caps_lock_only_affects_letters() {
        let mut decoder = ScancodeDecoder::new();
        let bytes = feed(&mut decoder, &[CAPS_LOCK, CAPS_LOCK | RELEASE, 0x10, 0x02]);
        assert_eq!(bytes, b"Q1");
    }

    #[test]
    fn test_ctrl_folds_letters() {
        let mut decoder = ScancodeDecoder::new();
        let bytes = feed(&mut decoder, &[CTRL, 0x2E, CTRL | RELEASE, 0x2E]);
        assert_eq!(bytes, [0x03, b'c']);
    }

    #[test]
    fn test_extended_and_modifier_codes_yield_nothing() {
        let mut decoder = ScancodeDecoder::new();
        assert_eq!(decoder.process_scancode(EXTENDED_PREFIX), None);
        assert_eq!(decoder.process_scancode(0x48), None);
        assert_eq!(decoder.process_scancode(ALT), None);
        assert_eq!(decoder.process_scancode(0x3B), None);
        assert_eq!(decoder.process_scancode(0x0E).and_then(|k| k.as_byte()), Some(0x08));
    }
}
