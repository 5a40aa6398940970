//! Bytestream <-> MIDI 1.0 packet stream translation.

use crate::packet::bytes_to_word;
use crate::{Message, Packet};

/// Converts one bytestream message into MIDI 1.0 protocol packets.
///
/// Channel-voice and system messages become single 32-bit packets; SysEx is
/// chunked into 64-bit SysEx7 packets carrying up to six payload bytes each.
/// Statuses with no defined length are dropped.
pub(crate) fn bytestream_to_midi1<F>(group: u8, message: &Message, mut emit: F)
where
    F: FnMut(Packet),
{
    let group = group & 0xF;

    if let Some(payload) = message.sysex_payload() {
        emit_sysex7(group, payload, emit);
        return;
    }

    let status = message.status();
    if Message::expected_len(status).is_none() {
        return;
    }
    let d1 = message.bytes.get(1).copied().unwrap_or(0);
    let d2 = message.bytes.get(2).copied().unwrap_or(0);
    let message_type: u8 = if status >= 0xF0 { 0x1 } else { 0x2 };

    emit(Packet::x1(bytes_to_word(
        message_type << 4 | group,
        status,
        d1,
        d2,
    )));
}

fn emit_sysex7<F>(group: u8, payload: &[u8], mut emit: F)
where
    F: FnMut(Packet),
{
    // SysEx7 chunk statuses: 0 complete, 1 start, 2 continue, 3 end.
    let chunk_count = payload.len().div_ceil(6).max(1);
    let mut chunks = payload.chunks(6);

    for i in 0..chunk_count {
        let chunk = chunks.next().unwrap_or(&[]);
        let status: u8 = match (chunk_count, i) {
            (1, _) => 0x0,
            (_, 0) => 0x1,
            (n, i) if i == n - 1 => 0x3,
            _ => 0x2,
        };

        let mut b = [0u8; 6];
        b[..chunk.len()].copy_from_slice(chunk);
        let w0 = bytes_to_word(0x30 | group, status << 4 | chunk.len() as u8, b[0], b[1]);
        let w1 = bytes_to_word(b[2], b[3], b[4], b[5]);
        emit(Packet::x2(w0, w1));
    }
}

#[derive(Default)]
struct SysEx7Assembler {
    buffer: Vec<u8>,
    active: bool,
}

impl SysEx7Assembler {
    fn abandon(&mut self) {
        self.buffer.clear();
        self.active = false;
    }
}

/// Translates a MIDI 1.0 packet stream back into bytestream messages.
///
/// SysEx7 frames are reassembled per group and emitted once complete.
/// System-realtime packets pass straight through, even mid-SysEx; utility
/// packets are ignored; any other packet interrupts (and discards) an
/// in-progress SysEx, matching the wire protocol's termination rule.
pub struct UmpToBytestream {
    assemblers: Vec<SysEx7Assembler>,
}

impl UmpToBytestream {
    pub fn new() -> Self {
        Self {
            assemblers: (0..16).map(|_| SysEx7Assembler::default()).collect(),
        }
    }

    /// Clears SysEx reassembly state for every group.
    pub fn reset(&mut self) {
        for assembler in &mut self.assemblers {
            assembler.abandon();
        }
    }

    pub fn dispatch<F>(&mut self, packet: &Packet, mut emit: F)
    where
        F: FnMut(Message),
    {
        match packet.message_type() {
            // Utility packets carry no bytestream equivalent.
            0x0 => {}
            0x1 => {
                let status = packet.status_byte();
                if status >= 0xF8 {
                    emit(Message {
                        bytes: vec![status],
                    });
                } else {
                    self.assemblers[packet.group() as usize].abandon();
                    emit_short(packet, emit);
                }
            }
            0x2 => {
                self.assemblers[packet.group() as usize].abandon();
                emit_short(packet, emit);
            }
            0x3 => self.dispatch_sysex7(packet, emit),
            // MIDI 2.0 channel voice and 128-bit data need translation
            // before they have a bytestream form; not this type's job.
            _ => {}
        }
    }

    fn dispatch_sysex7<F>(&mut self, packet: &Packet, mut emit: F)
    where
        F: FnMut(Message),
    {
        let words = packet.words();
        let w0 = words[0];
        let w1 = words.get(1).copied().unwrap_or(0);
        let status = ((w0 >> 20) & 0xF) as u8;
        let count = (((w0 >> 16) & 0xF) as usize).min(6);
        let data = [
            (w0 >> 8) as u8,
            w0 as u8,
            (w1 >> 24) as u8,
            (w1 >> 16) as u8,
            (w1 >> 8) as u8,
            w1 as u8,
        ];
        let bytes = &data[..count];

        let assembler = &mut self.assemblers[packet.group() as usize];
        match status {
            0x0 => {
                assembler.abandon();
                emit(Message::sys_ex(bytes));
            }
            0x1 => {
                assembler.buffer.clear();
                assembler.buffer.extend_from_slice(bytes);
                assembler.active = true;
            }
            0x2 => {
                if assembler.active {
                    assembler.buffer.extend_from_slice(bytes);
                }
            }
            0x3 => {
                if assembler.active {
                    assembler.buffer.extend_from_slice(bytes);
                    let message = Message::sys_ex(&assembler.buffer);
                    assembler.abandon();
                    emit(message);
                }
            }
            _ => assembler.abandon(),
        }
    }
}

impl Default for UmpToBytestream {
    fn default() -> Self {
        Self::new()
    }
}

fn emit_short<F>(packet: &Packet, mut emit: F)
where
    F: FnMut(Message),
{
    let status = packet.status_byte();
    let Some(len) = Message::expected_len(status) else {
        return;
    };
    let w0 = packet.words()[0];
    let mut bytes = vec![status];
    if len > 1 {
        bytes.push((w0 >> 8) as u8 & 0x7F);
    }
    if len > 2 {
        bytes.push(w0 as u8 & 0x7F);
    }
    emit(Message { bytes });
}
