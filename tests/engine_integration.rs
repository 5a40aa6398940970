//! End-to-end flows across the subsystems: a simulated audio callback that
//! re-blocks its input and emits MIDI through the lock-free ring into the
//! scheduled, protocol-converted output.

use attacca::{
    output_channel, FixedBlockReservoir, Message, OutputAggregator, Packet, PacketProtocol,
    ScheduleConfig, UmpOutput,
};
use crossbeam_channel::unbounded;
use std::time::{Duration, Instant};

/// Mono reservoir, 64-sample blocks, 4 multiples: pushing blocks of 10, 54
/// and 200 samples processes exactly 256 samples and carries 8.
#[test]
fn test_reservoir_re_blocks_host_callback_sizes() {
    let mut reservoir = FixedBlockReservoir::new(1, 1, 64, 4);
    let mut processed = 0usize;
    let mut calls = Vec::new();

    for block_len in [10usize, 54, 200] {
        let mut block = vec![0.25f32; block_len];
        let mut io = [block.as_mut_slice()];
        reservoir.push(&mut io, |_, len| {
            processed += len;
            calls.push(len);
        });
    }

    assert_eq!(processed, 256);
    assert_eq!(reservoir.buffered(), 8);
    assert!(calls.iter().all(|len| len % 64 == 0));
}

/// Audio callback emits note events (lock-free); the control side drains
/// them into the packet output; the sink sees MIDI 2.0 packets in order.
#[test]
fn test_audio_callback_to_packet_sink() {
    let (tx, rx) = unbounded();
    let output = UmpOutput::new(
        0,
        PacketProtocol::Midi2,
        ScheduleConfig::default(),
        move |packet: Packet| {
            let _ = tx.send(packet);
        },
    );
    output.start().unwrap();

    let aggregator = OutputAggregator::new();
    let (mut producer, consumer) = output_channel();
    aggregator.add_consumer(consumer);

    // "Audio thread": re-block audio, emit a note per processed block.
    let mut reservoir = FixedBlockReservoir::new(1, 1, 32, 2);
    let origin = Instant::now();
    let mut block_index = 0u8;
    for block_len in [20usize, 30, 40] {
        let mut audio = vec![0.0f32; block_len];
        let mut io = [audio.as_mut_slice()];
        let producer = &mut producer;
        reservoir.push(&mut io, |_, _| {
            producer.push(
                Message::note_on(0, 60 + block_index, 100),
                origin + Duration::from_millis(5 * block_index as u64),
            );
            block_index += 1;
        });
    }

    // "Control thread": hand collected messages to the output.
    let drained = aggregator.drain_all();
    assert_eq!(drained.len(), 2);
    for timed in &drained {
        output.send_at(timed.message.clone(), timed.due);
    }

    let packets: Vec<Packet> = (0..drained.len())
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    output.stop();

    // MIDI 2.0 note-ons, notes ascending with block order.
    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(packet.message_type(), 0x4);
        assert_eq!(packet.status_byte() >> 4, 0x9);
        let note = (packet.words()[0] >> 8) & 0x7F;
        assert_eq!(note, 60 + i as u32);
    }
}
