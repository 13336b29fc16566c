//! Console/keyboard stand-ins: `input_getc`, `putbuf`, `shutdown_power_off`
//! (spec §6). The keyboard scancode-to-ASCII table is grounded in the
//! teacher crate's `drivers::keyboard::scancodes` table, trimmed to plain
//! ASCII since `input_getc` hands back raw bytes, not a rich `KeyCode`.

use alloc::collections::VecDeque;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::sync::Semaphore;

struct KeyboardState {
    shift: bool,
    caps_lock: bool,
}

impl KeyboardState {
    const fn new() -> Self {
        KeyboardState { shift: false, caps_lock: false }
    }

    fn translate(&mut self, scancode: u8) -> Option<u8> {
        if scancode & 0x80 != 0 {
            // Break code.
            match scancode & 0x7F {
                0x2A | 0x36 => self.shift = false,
                _ => {}
            }
            return None;
        }
        match scancode {
            0x2A | 0x36 => { self.shift = true; None }
            0x3A => { self.caps_lock = !self.caps_lock; None }
            0x1C => Some(b'\n'),
            0x0E => Some(0x08), // backspace
            0x39 => Some(b' '),
            _ => ROWS.iter().find(|(code, _, _)| *code == scancode).map(|(_, lower, upper)| {
                let want_upper = self.shift ^ (self.caps_lock && lower.is_ascii_lowercase());
                if want_upper { *upper } else { *lower }
            }),
        }
    }
}

/// (scancode, lowercase, shifted) triples for the alphanumeric rows.
static ROWS: &[(u8, u8, u8)] = &[
    (0x02, b'1', b'!'), (0x03, b'2', b'@'), (0x04, b'3', b'#'), (0x05, b'4', b'$'),
    (0x06, b'5', b'%'), (0x07, b'6', b'^'), (0x08, b'7', b'&'), (0x09, b'8', b'*'),
    (0x0A, b'9', b'('), (0x0B, b'0', b')'),
    (0x10, b'q', b'Q'), (0x11, b'w', b'W'), (0x12, b'e', b'E'), (0x13, b'r', b'R'),
    (0x14, b't', b'T'), (0x15, b'y', b'Y'), (0x16, b'u', b'U'), (0x17, b'i', b'I'),
    (0x18, b'o', b'O'), (0x19, b'p', b'P'),
    (0x1E, b'a', b'A'), (0x1F, b's', b'S'), (0x20, b'd', b'D'), (0x21, b'f', b'F'),
    (0x22, b'g', b'G'), (0x23, b'h', b'H'), (0x24, b'j', b'J'), (0x25, b'k', b'K'),
    (0x26, b'l', b'L'),
    (0x2C, b'z', b'Z'), (0x2D, b'x', b'X'), (0x2E, b'c', b'C'), (0x2F, b'v', b'V'),
    (0x30, b'b', b'B'), (0x31, b'n', b'N'), (0x32, b'm', b'M'),
];

lazy_static! {
    static ref KEYBOARD_STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());
    static ref KEY_QUEUE: Mutex<VecDeque<u8>> = Mutex::new(VecDeque::new());
    /// Signalled once per byte enqueued; `input_getc` blocks on it rather
    /// than busy-waiting, so it is a genuine suspension point (spec §5).
    static ref KEY_READY: Semaphore = Semaphore::new(0);
}

/// Called from the keyboard IRQ handler with the raw scancode.
pub fn push_scancode(scancode: u8) {
    if let Some(byte) = KEYBOARD_STATE.lock().translate(scancode) {
        KEY_QUEUE.lock().push_back(byte);
        KEY_READY.up();
    }
}

/// `input_getc`: blocking read of a single byte from the keyboard.
pub fn input_getc() -> u8 {
    loop {
        KEY_READY.down();
        if let Some(byte) = KEY_QUEUE.lock().pop_front() {
            return byte;
        }
    }
}

/// `putbuf`: unbuffered console write.
pub fn putbuf(buf: &[u8]) {
    use core::fmt::Write;
    let mut serial = crate::serial::SERIAL1.lock();
    for &b in buf {
        let _ = serial.write_char(b as char);
    }
}

/// `shutdown_power_off`: terminate the (simulated) machine.
pub fn shutdown_power_off() -> ! {
    crate::log_info!("device: shutdown requested, halting.");
    loop {
        x86_64::instructions::hlt();
    }
}
