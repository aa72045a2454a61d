//! Offline render driver.
//!
//! Stands in for an audio device: it chops a run of frames into fixed-size
//! blocks and hands each block's true frame count to a callback, the same way
//! a device callback would. Useful for bouncing, tests and benchmarks.

/// Deterministic block driver with no real-time deadline
#[derive(Debug, Clone)]
pub struct OfflineDriver {
    block_size: usize,
    frames_rendered: u64,
}

impl OfflineDriver {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            frames_rendered: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total frames handed out so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Render `total_frames` frames, calling `on_block(frames)` once per block.
    ///
    /// Every block is full except possibly the last. Returns the number of
    /// blocks rendered.
    pub fn render<F: FnMut(usize)>(&mut self, total_frames: u64, mut on_block: F) -> usize {
        let mut remaining = total_frames;
        let mut blocks = 0;
        while remaining > 0 {
            let frames = remaining.min(self.block_size as u64) as usize;
            on_block(frames);
            remaining -= frames as u64;
            self.frames_rendered += frames as u64;
            blocks += 1;
        }
        blocks
    }
}
