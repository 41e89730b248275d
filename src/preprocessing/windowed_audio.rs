use std::collections::VecDeque;
use std::iter::Fuse;

/// A hop-aligned slice of the input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    /// Position of the first sample in the input stream.
    pub offset: usize,
    pub samples: Vec<f64>,
}

pub struct WindowedAudio<I: Iterator<Item = f64>> {
    source: Fuse<I>,
    buffer: VecDeque<f64>,
    frame_length: usize,
    hop_size: usize,
    index: usize,
}

impl<I: Iterator<Item = f64>> Iterator for WindowedAudio<I> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.len() < self.frame_length {
            // fewer than a full frame left, the stream is done
            self.buffer.push_back(self.source.next()?);
        }

        let samples: Vec<f64> = self.buffer.iter().take(self.frame_length).copied().collect();
        let frame = Frame {
            index: self.index,
            offset: self.index * self.hop_size,
            samples,
        };

        let advance = self.hop_size.min(self.buffer.len());
        self.buffer.drain(..advance);
        self.index += 1;
        Some(frame)
    }
}

/// Slice a sample stream into overlapping frames of `frame_length` samples,
/// advancing by `hop_size`. The trailing partial frame is dropped.
pub fn window_audio<I>(samples: I, frame_length: usize, hop_size: usize) -> WindowedAudio<I::IntoIter>
where
    I: IntoIterator<Item = f64>,
{
    WindowedAudio {
        source: samples.into_iter().fuse(),
        buffer: VecDeque::with_capacity(frame_length + hop_size),
        frame_length,
        hop_size,
        index: 0,
    }
}
