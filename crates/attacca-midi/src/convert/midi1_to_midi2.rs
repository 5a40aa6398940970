//! Default MIDI 1.0 -> MIDI 2.0 protocol translation.

use crate::scale::{scale_14_to_32, scale_7_to_16, scale_7_to_32};
use crate::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Addressing {
    #[default]
    None,
    Rpn,
    Nrpn,
}

/// Per-channel accumulator for the multi-message MIDI 1.0 sequences that
/// collapse into single MIDI 2.0 packets.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    addressing: Addressing,
    rpn_bank: u8,
    rpn_index: u8,
    nrpn_bank: u8,
    nrpn_index: u8,
    data_coarse: u8,
    bank_msb: u8,
    bank_lsb: u8,
    bank_set: bool,
}

/// Stateful translator from MIDI 1.0 protocol packets to MIDI 2.0 protocol
/// packets, keyed by group and channel.
///
/// RPN/NRPN controller runs (CC 101/100 or 99/98 selecting the parameter,
/// CC 6/38 carrying the value) accumulate and emit one registered- or
/// assignable-controller packet on the data-entry LSB. Bank select
/// (CC 0/32) accumulates and is emitted with the next program change.
/// Packets that are not MIDI 1.0 channel voice pass through unchanged.
pub struct Midi1ToMidi2Translator {
    state: [[ChannelState; 16]; 16],
}

impl Midi1ToMidi2Translator {
    pub fn new() -> Self {
        Self {
            state: [[ChannelState::default(); 16]; 16],
        }
    }

    /// Clears all accumulated parameter-number and bank state.
    pub fn reset(&mut self) {
        self.state = [[ChannelState::default(); 16]; 16];
    }

    pub fn dispatch<F>(&mut self, packet: &Packet, mut emit: F)
    where
        F: FnMut(Packet),
    {
        if packet.message_type() != 0x2 {
            emit(*packet);
            return;
        }

        let w0 = packet.words()[0];
        let group = packet.group();
        let status = packet.status_byte();
        let opcode = status >> 4;
        let channel = status & 0xF;
        let d1 = ((w0 >> 8) & 0x7F) as u8;
        let d2 = (w0 & 0x7F) as u8;

        let head =
            |op: u8| -> u32 { 0x4 << 28 | (group as u32) << 24 | ((op << 4 | channel) as u32) << 16 };

        match opcode {
            0x8 => emit(Packet::x2(
                head(0x8) | (d1 as u32) << 8,
                (scale_7_to_16(d2) as u32) << 16,
            )),
            0x9 => {
                // A zero-velocity note-on is a note-off on the wire.
                if d2 == 0 {
                    emit(Packet::x2(head(0x8) | (d1 as u32) << 8, 0));
                } else {
                    emit(Packet::x2(
                        head(0x9) | (d1 as u32) << 8,
                        (scale_7_to_16(d2) as u32) << 16,
                    ));
                }
            }
            0xA => emit(Packet::x2(head(0xA) | (d1 as u32) << 8, scale_7_to_32(d2))),
            0xB => self.control_change(group, channel, d1, d2, head, emit),
            0xC => {
                let state = &mut self.state[group as usize][channel as usize];
                if state.bank_set {
                    emit(Packet::x2(
                        head(0xC) | 1,
                        (d1 as u32) << 24 | (state.bank_msb as u32) << 8 | state.bank_lsb as u32,
                    ));
                } else {
                    emit(Packet::x2(head(0xC), (d1 as u32) << 24));
                }
            }
            0xD => emit(Packet::x2(head(0xD), scale_7_to_32(d1))),
            0xE => emit(Packet::x2(
                head(0xE),
                scale_14_to_32((d2 as u16) << 7 | d1 as u16),
            )),
            _ => {}
        }
    }

    fn control_change<F, H>(
        &mut self,
        group: u8,
        channel: u8,
        controller: u8,
        value: u8,
        head: H,
        mut emit: F,
    ) where
        F: FnMut(Packet),
        H: Fn(u8) -> u32,
    {
        let state = &mut self.state[group as usize][channel as usize];

        match controller {
            101 => {
                state.addressing = Addressing::Rpn;
                state.rpn_bank = value;
            }
            100 => {
                state.addressing = Addressing::Rpn;
                state.rpn_index = value;
            }
            99 => {
                state.addressing = Addressing::Nrpn;
                state.nrpn_bank = value;
            }
            98 => {
                state.addressing = Addressing::Nrpn;
                state.nrpn_index = value;
            }
            6 => state.data_coarse = value,
            38 => {
                let data = scale_14_to_32((state.data_coarse as u16) << 7 | value as u16);
                match state.addressing {
                    Addressing::Rpn => emit(Packet::x2(
                        head(0x2) | (state.rpn_bank as u32) << 8 | state.rpn_index as u32,
                        data,
                    )),
                    Addressing::Nrpn => emit(Packet::x2(
                        head(0x3) | (state.nrpn_bank as u32) << 8 | state.nrpn_index as u32,
                        data,
                    )),
                    // Data entry with no parameter selected goes nowhere.
                    Addressing::None => {}
                }
            }
            0 => {
                state.bank_msb = value;
                state.bank_set = true;
            }
            32 => {
                state.bank_lsb = value;
                state.bank_set = true;
            }
            _ => emit(Packet::x2(
                head(0xB) | (controller as u32) << 8,
                scale_7_to_32(value),
            )),
        }
    }
}

impl Default for Midi1ToMidi2Translator {
    fn default() -> Self {
        Self::new()
    }
}
