//! Legacy bytestream MIDI messages.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One complete bytestream MIDI message: a status byte followed by its data
/// bytes, or a full `F0 .. F7` SysEx frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Raw wire bytes, ready to hand to a MIDI output.
    pub bytes: Vec<u8>,
}

impl Message {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15); // MIDI channels are 0-15
        Self {
            bytes: vec![0x90 | channel, note & 0x7F, velocity & 0x7F],
        }
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15);
        Self {
            bytes: vec![0x80 | channel, note & 0x7F, velocity & 0x7F],
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        let channel = channel.min(15);
        Self {
            bytes: vec![0xB0 | channel, controller & 0x7F, value & 0x7F],
        }
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        let channel = channel.min(15);
        Self {
            bytes: vec![0xC0 | channel, program & 0x7F],
        }
    }

    pub fn channel_pressure(channel: u8, pressure: u8) -> Self {
        let channel = channel.min(15);
        Self {
            bytes: vec![0xD0 | channel, pressure & 0x7F],
        }
    }

    pub fn poly_pressure(channel: u8, note: u8, pressure: u8) -> Self {
        let channel = channel.min(15);
        Self {
            bytes: vec![0xA0 | channel, note & 0x7F, pressure & 0x7F],
        }
    }

    /// `value`: signed 14-bit (-8192 to 8191).
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        let channel = channel.min(15);
        // Convert signed value (-8192 to 8191) to unsigned 14-bit (0 to 16383)
        let unsigned = (value as i32 + 8192).clamp(0, 16383) as u16;
        let lsb = (unsigned & 0x7F) as u8;
        let msb = ((unsigned >> 7) & 0x7F) as u8;
        Self {
            bytes: vec![0xE0 | channel, lsb, msb],
        }
    }

    /// Wraps a payload of 7-bit bytes in an `F0 .. F7` frame.
    pub fn sys_ex(payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + 2);
        bytes.push(0xF0);
        bytes.extend(payload.iter().map(|b| b & 0x7F));
        bytes.push(0xF7);
        Self { bytes }
    }

    pub fn timing_clock() -> Self {
        Self { bytes: vec![0xF8] }
    }

    pub fn start() -> Self {
        Self { bytes: vec![0xFA] }
    }

    pub fn stop() -> Self {
        Self { bytes: vec![0xFC] }
    }

    pub fn active_sensing() -> Self {
        Self { bytes: vec![0xFE] }
    }

    pub fn system_reset() -> Self {
        Self { bytes: vec![0xFF] }
    }

    pub fn song_position(beats: u16) -> Self {
        let beats = beats.min(16383);
        Self {
            bytes: vec![0xF2, (beats & 0x7F) as u8, (beats >> 7) as u8],
        }
    }

    /// Validates raw wire bytes: known status, length matching the status,
    /// SysEx terminated by `F7`.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let &status = bytes.first().ok_or(Error::Empty)?;
        if status < 0x80 {
            return Err(Error::InvalidStatus(status));
        }
        if status == 0xF0 {
            if bytes.last() != Some(&0xF7) || bytes.len() < 2 {
                return Err(Error::UnterminatedSysEx);
            }
            return Ok(Self {
                bytes: bytes.to_vec(),
            });
        }
        match Self::expected_len(status) {
            Some(expected) if bytes.len() == expected => Ok(Self {
                bytes: bytes.to_vec(),
            }),
            Some(expected) => Err(Error::Truncated {
                status,
                expected,
                actual: bytes.len(),
            }),
            None => Err(Error::InvalidStatus(status)),
        }
    }

    /// Wire length implied by a status byte; `None` for SysEx and the
    /// undefined system statuses.
    pub fn expected_len(status: u8) -> Option<usize> {
        match status {
            0x80..=0xBF | 0xE0..=0xEF => Some(3),
            0xC0..=0xDF => Some(2),
            0xF1 | 0xF3 => Some(2),
            0xF2 => Some(3),
            0xF6 | 0xF8 | 0xFA | 0xFB | 0xFC | 0xFE | 0xFF => Some(1),
            _ => None,
        }
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// Channel (0-15) for channel-voice messages.
    pub fn channel(&self) -> Option<u8> {
        match self.status() {
            0x80..=0xEF => Some(self.status() & 0x0F),
            _ => None,
        }
    }

    pub fn is_sys_ex(&self) -> bool {
        self.status() == 0xF0
    }

    /// True for the single-byte system realtime messages (`F8..FF`).
    pub fn is_realtime(&self) -> bool {
        self.status() >= 0xF8
    }

    /// SysEx payload with the `F0`/`F7` framing stripped.
    pub fn sysex_payload(&self) -> Option<&[u8]> {
        if !self.is_sys_ex() {
            return None;
        }
        let inner = &self.bytes[1..];
        Some(match inner.last() {
            Some(&0xF7) => &inner[..inner.len() - 1],
            _ => inner,
        })
    }
}
