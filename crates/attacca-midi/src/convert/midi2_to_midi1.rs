//! Default MIDI 2.0 -> MIDI 1.0 protocol translation.

use crate::scale::{scale_16_to_7, scale_32_to_14, scale_32_to_7};
use crate::Packet;

/// Controllers that only exist as accumulation fragments in MIDI 1.0
/// (data entry, RPN/NRPN select, bank select); a MIDI 2.0 stream carries
/// their combined forms instead, so bare ones are dropped.
const ACCUMULATING_CCS: [u8; 8] = [6, 38, 98, 99, 100, 101, 0, 32];

/// Translates one MIDI 2.0 protocol packet into zero or more MIDI 1.0
/// protocol packets. Stateless: every MIDI 2.0 channel-voice packet already
/// carries everything its MIDI 1.0 expansion needs.
///
/// Utility, system, MIDI 1.0 channel-voice, SysEx7 and 128-bit data packets
/// pass through unchanged. Per-note and other opcodes with no MIDI 1.0
/// equivalent are dropped.
pub fn midi2_to_midi1<F>(packet: &Packet, mut emit: F)
where
    F: FnMut(Packet),
{
    let message_type = packet.message_type();
    if message_type != 0x4 {
        if matches!(message_type, 0x0..=0x3 | 0x5) {
            emit(*packet);
        }
        return;
    }

    let w0 = packet.words()[0];
    let w1 = packet.words().get(1).copied().unwrap_or(0);
    let group = packet.group();
    let status = packet.status_byte();
    let opcode = status >> 4;
    let channel = status & 0xF;

    let x1 = |status: u8, d1: u8, d2: u8| -> Packet {
        Packet::x1(
            0x2 << 28 | (group as u32) << 24 | (status as u32) << 16 | (d1 as u32) << 8 | d2 as u32,
        )
    };
    let voice = |op: u8| -> u8 { op << 4 | channel };

    match opcode {
        0x8 => {
            let note = ((w0 >> 8) & 0x7F) as u8;
            emit(x1(voice(0x8), note, scale_16_to_7((w1 >> 16) as u16)));
        }
        0x9 => {
            let note = ((w0 >> 8) & 0x7F) as u8;
            // A scaled velocity of zero would read as a note-off downstream.
            let velocity = scale_16_to_7((w1 >> 16) as u16).max(1);
            emit(x1(voice(0x9), note, velocity));
        }
        0xA => {
            let note = ((w0 >> 8) & 0x7F) as u8;
            emit(x1(voice(0xA), note, scale_32_to_7(w1)));
        }
        0xB => {
            let index = ((w0 >> 8) & 0x7F) as u8;
            if !ACCUMULATING_CCS.contains(&index) {
                emit(x1(voice(0xB), index, scale_32_to_7(w1)));
            }
        }
        // Registered / assignable controllers expand to the classic
        // four-CC sequence.
        0x2 | 0x3 => {
            let bank = ((w0 >> 8) & 0x7F) as u8;
            let index = (w0 & 0x7F) as u8;
            let data = scale_32_to_14(w1);
            let (select_msb, select_lsb) = if opcode == 0x2 { (101, 100) } else { (99, 98) };
            emit(x1(voice(0xB), select_msb, bank));
            emit(x1(voice(0xB), select_lsb, index));
            emit(x1(voice(0xB), 6, (data >> 7) as u8));
            emit(x1(voice(0xB), 38, (data & 0x7F) as u8));
        }
        0xC => {
            let program = ((w1 >> 24) & 0x7F) as u8;
            if w0 & 1 != 0 {
                emit(x1(voice(0xB), 0, ((w1 >> 8) & 0x7F) as u8));
                emit(x1(voice(0xB), 32, (w1 & 0x7F) as u8));
            }
            emit(x1(voice(0xC), program, 0));
        }
        0xD => emit(x1(voice(0xD), scale_32_to_7(w1), 0)),
        0xE => {
            let bend = scale_32_to_14(w1);
            emit(x1(voice(0xE), (bend & 0x7F) as u8, (bend >> 7) as u8));
        }
        _ => {}
    }
}
