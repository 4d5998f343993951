use crate::{
    backend::OutputCallback,
    context::{AudioContext, StreamId},
    meter::{self, VolumeLevel},
    pcm,
};
use live_core::Result;
use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, info, warn};

/// Chunks that may wait between the control side and the audio callback.
pub const QUEUE_CAPACITY: usize = 512;

/// A chunk on its way to the audio callback, tagged with the flush epoch
/// it was scheduled in.
pub struct PlaybackChunk {
    pub epoch: u64,
    pub samples: Vec<f32>,
}

/// Audio-thread side of the playback pipeline: plays chunks back to back.
#[derive(Default)]
pub struct PlaybackQueue {
    chunks: VecDeque<Vec<f32>>,
    offset: usize,
    epoch: u64,
}

impl PlaybackQueue {
    /// Moves to a later flush epoch, discarding everything queued or playing.
    pub fn flush_to(&mut self, epoch: u64) {
        if epoch > self.epoch {
            self.chunks.clear();
            self.offset = 0;
            self.epoch = epoch;
        }
    }

    /// Queues a chunk unless a flush has happened since it was scheduled.
    pub fn push(&mut self, chunk: PlaybackChunk) -> bool {
        self.flush_to(chunk.epoch);
        if chunk.epoch < self.epoch || chunk.samples.is_empty() {
            return false;
        }
        self.chunks.push_back(chunk.samples);
        true
    }

    /// Fills `out` from the queue and pads with silence.
    /// Returns the number of queued samples written.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        while written < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let available = front.len() - self.offset;
            let n = available.min(out.len() - written);
            out[written..written + n].copy_from_slice(&front[self.offset..self.offset + n]);
            written += n;
            if n == available {
                self.chunks.pop_front();
                self.offset = 0;
            } else {
                self.offset += n;
            }
        }
        out[written..].fill(0.0);
        written
    }

    pub fn queued_samples(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum::<usize>() - self.offset
    }
}

struct Schedule {
    producer: HeapProd<PlaybackChunk>,
    /// Frame at which the last scheduled chunk ends.
    cursor: u64,
}

/// Streams inbound PCM16 audio to an output device.
///
/// Chunks play strictly in the order they were added. Times are counted in
/// frames rendered by the output since it opened.
pub struct AudioStreamer {
    context: Arc<AudioContext>,
    stream: StreamId,
    schedule: Mutex<Schedule>,
    epoch: Arc<AtomicU64>,
    clock: Arc<AtomicU64>,
    volume: Arc<VolumeLevel>,
}

impl AudioStreamer {
    /// Opens an output stream on `context` and starts rendering silence.
    pub async fn open(context: Arc<AudioContext>) -> Result<Self> {
        let (producer, consumer) = HeapRb::<PlaybackChunk>::new(QUEUE_CAPACITY).split();
        let epoch = Arc::new(AtomicU64::new(0));
        let clock = Arc::new(AtomicU64::new(0));
        let volume = Arc::new(VolumeLevel::default());

        let callback = playback_worklet(consumer, epoch.clone(), clock.clone(), volume.clone());
        let stream = context.open_output(callback).wait().await?;
        info!(
            context_id = context.id(),
            sample_rate = context.sample_rate(),
            "Playback started."
        );

        Ok(Self {
            context,
            stream,
            schedule: Mutex::new(Schedule {
                producer,
                cursor: 0,
            }),
            epoch,
            clock,
            volume,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    /// Frames rendered so far.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Frame at which the already scheduled audio runs out.
    pub fn cursor(&self) -> u64 {
        self.schedule.lock().cursor
    }

    /// Volume of the last rendered buffer.
    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    /// Schedules PCM16 bytes right after everything added before.
    ///
    /// Returns the frame the chunk is scheduled to start at, or `None` when
    /// the chunk is empty or the queue is full.
    pub fn add_chunk(&self, pcm16: &[u8]) -> Option<u64> {
        let samples = pcm::pcm16_to_f32(pcm16);
        if samples.is_empty() {
            return None;
        }
        let frames = samples.len() as u64;

        let mut schedule = self.schedule.lock();
        let start = schedule.cursor.max(self.now());
        let chunk = PlaybackChunk {
            epoch: self.epoch.load(Ordering::Acquire),
            samples,
        };
        if schedule.producer.try_push(chunk).is_err() {
            warn!(frames, "Playback queue full, chunk dropped.");
            return None;
        }
        schedule.cursor = start + frames;
        Some(start)
    }

    /// Hard stop: silences the chunk playing now, discards every queued
    /// chunk and moves the cursor back to now.
    pub fn stop(&self) {
        let mut schedule = self.schedule.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        schedule.cursor = self.now();
        debug!(cursor = schedule.cursor, "Playback flushed.");
    }
}

impl Drop for AudioStreamer {
    fn drop(&mut self) {
        self.context.close_stream(self.stream);
    }
}

fn playback_worklet(
    mut consumer: HeapCons<PlaybackChunk>,
    epoch: Arc<AtomicU64>,
    clock: Arc<AtomicU64>,
    volume: Arc<VolumeLevel>,
) -> OutputCallback {
    let mut queue = PlaybackQueue::default();
    Box::new(move |out: &mut [f32]| {
        queue.flush_to(epoch.load(Ordering::Acquire));
        while let Some(chunk) = consumer.try_pop() {
            queue.push(chunk);
        }
        queue.render(out);
        volume.store(meter::volume(out));
        clock.fetch_add(out.len() as u64, Ordering::Release);
    })
}
