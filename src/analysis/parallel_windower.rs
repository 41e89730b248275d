//! Parallel frame analysis with ordered delivery.
//!
//! ```text
//!  samples ──▶ producer thread ──▶ rayon pool (FrameAnalyzer, any order)
//!                   │                         │
//!                   │  one-shot slot per frame│ result
//!                   ▼                         ▼
//!            bounded slot queue ──────▶ SpectralFrames (frame order)
//! ```
//!
//! The slot queue is the only handoff between producer and consumer. Its
//! capacity bounds the number of frames submitted but not yet consumed, and
//! the producer blocks on it rather than dropping frames.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::analysis::spectral_transform::{FrameAnalyzer, SpectralEstimate, SpectralTransform};
use crate::constants::IN_FLIGHT_PER_THREAD;
use crate::error::{Result, TranscribeError};
use crate::preprocessing::windowed_audio::window_audio;

type Slot = Receiver<Result<SpectralEstimate>>;

pub struct ParallelWindower<A: FrameAnalyzer = SpectralTransform> {
    analyzer: Arc<A>,
    frame_length: usize,
    hop_size: usize,
    pool: Arc<ThreadPool>,
    max_in_flight: usize,
}

impl<A: FrameAnalyzer> ParallelWindower<A> {
    /// Build a windower backed by its own worker pool.
    ///
    /// # Arguments
    ///
    /// * `analyzer` - Per-frame analysis run on the workers.
    /// * `frame_length` - Samples per frame.
    /// * `hop_size` - Samples between frame starts.
    /// * `threads` - Worker count, 0 for one per core.
    /// * `max_in_flight` - Bound on submitted but unconsumed frames, `None`
    ///   for a few per worker.
    pub fn new(
        analyzer: A,
        frame_length: usize,
        hop_size: usize,
        threads: usize,
        max_in_flight: Option<usize>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("spectral-worker-{}", i))
            .build()?;
        let max_in_flight = max_in_flight.unwrap_or(IN_FLIGHT_PER_THREAD * pool.current_num_threads()).max(1);

        log::debug!(
            "parallel windower: {} workers, {} frames in flight",
            pool.current_num_threads(),
            max_in_flight
        );

        Ok(Self {
            analyzer: Arc::new(analyzer),
            frame_length,
            hop_size,
            pool: Arc::new(pool),
            max_in_flight,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Start slicing `samples` on a producer thread and return the ordered
    /// result stream.
    pub fn process<I>(&self, samples: I) -> Result<SpectralFrames>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Send + 'static,
    {
        let (slot_tx, slot_rx) = bounded::<(usize, Slot)>(self.max_in_flight);
        let analyzer = Arc::clone(&self.analyzer);
        let pool = Arc::clone(&self.pool);
        let frame_length = self.frame_length;
        let hop_size = self.hop_size;
        let samples = samples.into_iter();

        let producer = thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || {
                for frame in window_audio(samples, frame_length, hop_size) {
                    let index = frame.index;
                    let (result_tx, result_rx) = bounded(1);

                    // Blocks while max_in_flight frames are waiting to be consumed.
                    if slot_tx.send((index, result_rx)).is_err() {
                        log::debug!("consumer gone, producer stopping before frame {}", index);
                        return;
                    }

                    let analyzer = Arc::clone(&analyzer);
                    pool.spawn(move || {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&frame)))
                            .unwrap_or_else(|_| Err(TranscribeError::WorkerPanicked(index)));
                        // The consumer may have given up on the stream already.
                        let _ = result_tx.send(result);
                    });
                }
            })?;

        Ok(SpectralFrames {
            slots: Some(slot_rx),
            producer: Some(producer),
        })
    }
}

/// Spectral estimates in frame order. Ends when the producer has sliced the
/// last full frame and every submitted frame has been yielded.
pub struct SpectralFrames {
    slots: Option<Receiver<(usize, Slot)>>,
    producer: Option<JoinHandle<()>>,
}

impl Iterator for SpectralFrames {
    type Item = Result<SpectralEstimate>;

    fn next(&mut self) -> Option<Self::Item> {
        let slots = self.slots.as_ref()?;

        match slots.recv() {
            Ok((index, slot)) => Some(slot.recv().unwrap_or_else(|_| Err(TranscribeError::WorkerLost(index)))),
            Err(_) => {
                // Disconnected: the producer has finished or died.
                self.slots = None;
                match self.producer.take().map(JoinHandle::join) {
                    Some(Err(_)) => Some(Err(TranscribeError::ProducerPanicked)),
                    _ => None,
                }
            }
        }
    }
}

impl Drop for SpectralFrames {
    fn drop(&mut self) {
        // Disconnect first so a producer blocked on a full queue wakes up.
        self.slots.take();
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
    }
}

/// Single-threaded reference: the same frames, analysed in order on the
/// calling thread.
pub fn analyze_sequential<A, I>(
    analyzer: A,
    samples: I,
    frame_length: usize,
    hop_size: usize,
) -> impl Iterator<Item = Result<SpectralEstimate>>
where
    A: FrameAnalyzer,
    I: IntoIterator<Item = f64>,
{
    window_audio(samples, frame_length, hop_size).map(move |frame| analyzer.analyze(&frame))
}
