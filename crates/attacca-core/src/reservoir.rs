//! Fixed-block re-blocking of an audio stream.
//!
//! Hosts deliver audio in blocks of whatever length they like; DSP engines
//! often require blocks that are an exact multiple of some minimum size.
//! [`FixedBlockReservoir`] sits between the two: it absorbs the incoming
//! stream into internal storage and invokes the processing callback only
//! with whole multiples of the configured minimum block size, carrying any
//! sub-block residue over to the next call.

use smallvec::SmallVec;

/// Channel-slice arrays stay inline (no allocation) up to this many channels.
const INLINE_CHANNELS: usize = 8;

/// Accumulates variable-length input blocks and releases fixed-size ones.
///
/// Single-writer, single-reader: the same thread drives both sides, so this
/// type is `Send` but deliberately has no interior synchronization.
/// Concurrent `push` calls from multiple threads are not supported.
///
/// Storage is sized once at construction; re-blocking with different
/// parameters requires a fresh reservoir.
pub struct FixedBlockReservoir {
    storage: Vec<Vec<f32>>,
    input_channels: usize,
    output_channels: usize,
    min_block_size: usize,
    capacity: usize,
    /// Samples written into `storage` and not yet compacted away.
    write_pos: usize,
    /// Samples already handed to the processing callback.
    /// Always a multiple of `min_block_size`, always <= `write_pos`.
    processed_pos: usize,
}

impl FixedBlockReservoir {
    /// Allocates storage for `max_block_multiples * min_block_size` samples
    /// across `max(input_channels, output_channels)` channels.
    ///
    /// Zero sizes are programmer errors; debug builds assert, release
    /// builds clamp to 1.
    pub fn new(
        input_channels: usize,
        output_channels: usize,
        min_block_size: usize,
        max_block_multiples: usize,
    ) -> Self {
        debug_assert!(input_channels > 0 || output_channels > 0);
        debug_assert!(min_block_size > 0);
        debug_assert!(max_block_multiples > 0);

        let channels = input_channels.max(output_channels).max(1);
        let min_block_size = min_block_size.max(1);
        let capacity = min_block_size * max_block_multiples.max(1);

        Self {
            storage: vec![vec![0.0; capacity]; channels],
            input_channels,
            output_channels,
            min_block_size,
            capacity,
            write_pos: 0,
            processed_pos: 0,
        }
    }

    pub fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    /// Total per-channel sample capacity (`max_block_multiples * min_block_size`).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered samples that have not yet been handed to the processor.
    /// Strictly less than `min_block_size` between `push` calls.
    pub fn buffered(&self) -> usize {
        self.write_pos - self.processed_pos
    }

    /// Clears positions and zeroes storage.
    pub fn reset(&mut self) {
        for channel in &mut self.storage {
            channel.fill(0.0);
        }
        self.write_pos = 0;
        self.processed_pos = 0;
    }

    /// Feeds one caller block through the reservoir.
    ///
    /// `io` is the caller's block: one sample slice per channel, all the
    /// same length. The first `input_channels` slices are read; the first
    /// `output_channels` slices are overwritten with the corresponding
    /// samples from internal storage as they are consumed (processed where
    /// a whole multiple of `min_block_size` had accumulated, otherwise the
    /// caller's own residue).
    ///
    /// `process` receives the internal channel slices and a length that is
    /// always an exact positive multiple of `min_block_size`, never more
    /// than `capacity()`. It may be invoked zero or more times per `push`.
    ///
    /// Never blocks; does not allocate for blocks of up to 8 channels.
    pub fn push<F>(&mut self, io: &mut [&mut [f32]], mut process: F)
    where
        F: FnMut(&mut [&mut [f32]], usize),
    {
        let num_samples = match io.first() {
            Some(first) => first.len(),
            None => return,
        };
        debug_assert!(io.iter().all(|c| c.len() == num_samples));

        let mut consumed = 0;

        // A single caller block may be larger than the free space left in
        // storage, so keep cutting chunks until everything is consumed.
        while consumed < num_samples {
            let chunk = (num_samples - consumed).min(self.capacity - self.write_pos);
            let chunk_start = self.write_pos;

            for ch in 0..self.input_channels.min(io.len()) {
                self.storage[ch][chunk_start..chunk_start + chunk]
                    .copy_from_slice(&io[ch][consumed..consumed + chunk]);
            }
            self.write_pos += chunk;

            let unprocessed = self.write_pos - self.processed_pos;
            let ready = unprocessed - unprocessed % self.min_block_size;
            if ready > 0 {
                let start = self.processed_pos;
                let mut channels: SmallVec<[&mut [f32]; INLINE_CHANNELS]> = self
                    .storage
                    .iter_mut()
                    .map(|c| &mut c[start..start + ready])
                    .collect();
                process(channels.as_mut_slice(), ready);
                self.processed_pos += ready;
            }

            for ch in 0..self.output_channels.min(io.len()) {
                io[ch][consumed..consumed + chunk]
                    .copy_from_slice(&self.storage[ch][chunk_start..chunk_start + chunk]);
            }
            consumed += chunk;

            // Storage full: everything up to processed_pos has been consumed,
            // so compact the sub-block residue to the front.
            if self.write_pos == self.capacity {
                let residue = self.write_pos - self.processed_pos;
                if residue > 0 {
                    let start = self.processed_pos;
                    for channel in &mut self.storage {
                        channel.copy_within(start..start + residue, 0);
                    }
                }
                self.write_pos = residue;
                self.processed_pos = 0;
            }
        }
    }
}
