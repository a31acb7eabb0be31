//! Somfy RTS radio shade support, transmit only.
//!
//! RTS is one-way: the shade never reports anything back, so this
//! module provides a [`SomfyRtsActuator`] that turns drive commands
//! into radio frames and is mounted under the ordinary
//! [`TimeBasedCover`](crate::drivers::TimeBasedCover); the estimator
//! does all the position work and the traits report assumed state.
//!
//! Frame layout before obfuscation, 7 bytes:
//!
//! ```text
//! key | button<<4 | rolling_hi | rolling_lo | addr0 | addr1 | addr2
//! ```
//!
//! The checksum is the XOR of all 14 nibbles, folded into the low
//! nibble of byte 1 so the whole frame XORs to zero nibble-wise. The
//! link layer then obfuscates by XOR-chaining each byte with its
//! predecessor. The 16-bit rolling code increments on every frame and
//! must survive reboots, or the receiver silently ignores the remote;
//! it persists through the same store the covers keep positions in.

use crate::restore::fnv1a;
use crate::traits::{CoverActuator, FrameLink, StateStore};

/// RTS button codes, pre-shift.
const BUTTON_MY: u8 = 0x1; // stop
const BUTTON_UP: u8 = 0x2;
const BUTTON_DOWN: u8 = 0x4;
const BUTTON_PROG: u8 = 0x8;

/// Fixed key nibble the real remotes transmit.
const KEY: u8 = 0xA0;

const FRAME_LEN: usize = 7;

// Rolling-code records are 2 bytes; the tag keeps them from colliding
// with position records hashed from the same name.
const ROLLING_KEY_TAG: u32 = 0x7274_7331; // "rts1"

/// Build one obfuscated RTS frame.
pub fn build_frame(button: u8, rolling_code: u16, address: u32) -> [u8; FRAME_LEN] {
    let [rolling_hi, rolling_lo] = rolling_code.to_be_bytes();
    let addr = address.to_le_bytes();
    let mut frame = [
        KEY | (rolling_code & 0x0F) as u8,
        button << 4,
        rolling_hi,
        rolling_lo,
        addr[0],
        addr[1],
        addr[2],
    ];

    // Fold the nibble XOR into the checksum slot so the frame XORs to
    // zero nibble-wise.
    let mut cksum = 0u8;
    for b in frame {
        cksum ^= b ^ (b >> 4);
    }
    frame[1] |= cksum & 0x0F;

    // Link-layer obfuscation.
    for i in 1..FRAME_LEN {
        frame[i] ^= frame[i - 1];
    }
    frame
}

/// Undo the link-layer obfuscation; test aid and receiver building
/// block.
pub fn deobfuscate(frame: &[u8; FRAME_LEN]) -> [u8; FRAME_LEN] {
    let mut out = *frame;
    for i in (1..FRAME_LEN).rev() {
        out[i] ^= out[i - 1];
    }
    out
}

/// Storage key for a remote's rolling code.
pub fn rolling_code_key(name: &str) -> u32 {
    fnv1a(name.as_bytes()) ^ ROLLING_KEY_TAG
}

/// Transmit-only actuator speaking Somfy RTS.
///
/// Mount it under a `TimeBasedCover` configured with a built-in
/// endstop (RTS motors stop at their own limits) and assumed state.
/// Each command consumes one rolling code and persists the successor.
pub struct SomfyRtsActuator<L: FrameLink, S: StateStore> {
    link: L,
    store: S,
    address: u32,
    rolling_code: u16,
    key: u32,
}

impl<L: FrameLink, S: StateStore> SomfyRtsActuator<L, S> {
    /// Creates an actuator for the remote `name` at the 24-bit
    /// `address`, restoring the rolling code if one was persisted.
    pub fn new(link: L, mut store: S, name: &str, address: u32) -> Self {
        let key = rolling_code_key(name);
        let mut buf = [0u8; 2];
        let rolling_code = if store.load(key, &mut buf) {
            u16::from_le_bytes(buf)
        } else {
            log::debug!("'{name}': no stored rolling code, starting at zero");
            0
        };
        Self {
            link,
            store,
            address: address & 0x00FF_FFFF,
            rolling_code,
            key,
        }
    }

    /// Rolling code the next frame will carry.
    pub fn rolling_code(&self) -> u16 {
        self.rolling_code
    }

    /// Transmit the pairing (PROG) frame.
    pub fn send_prog(&mut self) -> Result<(), L::Error> {
        self.send_button(BUTTON_PROG)
    }

    /// The wire link, for inspection in tests and integrations.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutable access to the wire link.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn send_button(&mut self, button: u8) -> Result<(), L::Error> {
        let frame = build_frame(button, self.rolling_code, self.address);
        self.link.send(&frame)?;
        self.rolling_code = self.rolling_code.wrapping_add(1);
        if !self.store.save(self.key, &self.rolling_code.to_le_bytes()) {
            log::warn!("failed to persist RTS rolling code {}", self.rolling_code);
        }
        Ok(())
    }
}

impl<L: FrameLink, S: StateStore> CoverActuator for SomfyRtsActuator<L, S> {
    type Error = L::Error;

    fn drive_open(&mut self) -> Result<(), L::Error> {
        self.send_button(BUTTON_UP)
    }

    fn drive_close(&mut self) -> Result<(), L::Error> {
        self.send_button(BUTTON_DOWN)
    }

    fn drive_stop(&mut self) -> Result<(), L::Error> {
        self.send_button(BUTTON_MY)
    }
}

impl<L: FrameLink, S: StateStore> core::fmt::Debug for SomfyRtsActuator<L, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SomfyRtsActuator")
            .field("address", &self.address)
            .field("rolling_code", &self.rolling_code)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
