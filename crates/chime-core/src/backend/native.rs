//! Native backend — symphonia decode + cpal output.
//!
//! Pipeline per play-through:
//! 1. a decoder thread decodes the file, remixes to the output channel
//!    count, resamples to the output rate and fills a sample queue
//! 2. cpal pulls from the queue in its output callback and applies volume
//! 3. a render thread keeps the stream alive until the queue runs dry
//!
//! When the media runs out on its own, the end of the iteration is
//! reported from a detached thread: the completion sequence calls back
//! into `stop`, which joins the workers. Every stop/start bumps a session
//! counter, so an end report that raced a `stop` is discarded.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::probe::{probe_media, MediaInfo};
use super::SoundBackend;
use crate::error::{BackendError, BackendResult};
use crate::sound::IterationNotifier;

/// About four seconds of 48 kHz stereo.
const QUEUE_CAPACITY: usize = 48_000 * 2 * 4;

type WorkerResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Plays one resource on the default output device.
pub struct NativeBackend {
    shared: Arc<Shared>,
}

struct Shared {
    media: Mutex<Option<LoadedMedia>>,
    /// f64 bits, already clamped by the controller.
    volume: AtomicU64,
    paused: AtomicBool,
    halt: AtomicBool,
    /// Workers alive for the current session.
    running: AtomicBool,
    /// Decoder or output failed; the session ends without an iteration report.
    failed: AtomicBool,
    session: AtomicU64,
    position_ms: AtomicU64,
    queue: Mutex<SampleQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
struct LoadedMedia {
    path: PathBuf,
    info: MediaInfo,
    notifier: IterationNotifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputFormat {
    sample_rate: u32,
    channels: u16,
}

impl OutputFormat {
    /// Playback time covered by `samples` interleaved output samples.
    fn samples_to_ms(self, samples: u64) -> u64 {
        let frames = samples / u64::from(self.channels.max(1));
        frames * 1000 / u64::from(self.sample_rate.max(1))
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                media: Mutex::new(None),
                volume: AtomicU64::new(1.0f64.to_bits()),
                paused: AtomicBool::new(false),
                halt: AtomicBool::new(false),
                running: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                session: AtomicU64::new(0),
                position_ms: AtomicU64::new(0),
                queue: Mutex::new(SampleQueue::new(QUEUE_CAPACITY)),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Position of the current play-through, as heard on the device.
    pub fn position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::SeqCst)
    }

    /// Duration of the loaded resource, when the container declares it.
    pub fn duration_ms(&self) -> Option<u64> {
        self.shared
            .media
            .lock()
            .as_ref()
            .and_then(|m| m.info.duration_ms)
    }

    pub fn media_info(&self) -> Option<MediaInfo> {
        self.shared.media.lock().as_ref().map(|m| m.info)
    }

    /// Signal the workers to exit and wait for them.
    ///
    /// Bumping the session first invalidates any pending iteration report.
    fn halt_workers(&self) {
        let shared = &self.shared;
        shared.session.fetch_add(1, Ordering::SeqCst);
        shared.halt.store(true, Ordering::SeqCst);
        shared.paused.store(false, Ordering::SeqCst);
        shared.queue.lock().reset();

        // Join outside the lock
        let handles: Vec<_> = shared.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("chime: audio worker panicked");
            }
        }
        shared.running.store(false, Ordering::SeqCst);
    }

    fn spawn_session(&self, media: LoadedMedia) -> BackendResult<()> {
        let output = select_output(&media.info)?;
        if output.sample_rate != media.info.sample_rate {
            log::info!(
                "chime: resampling {}Hz -> {}Hz",
                media.info.sample_rate,
                output.sample_rate
            );
        }

        let shared = &self.shared;
        let session = shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        shared.halt.store(false, Ordering::SeqCst);
        shared.paused.store(false, Ordering::SeqCst);
        shared.failed.store(false, Ordering::SeqCst);
        shared.position_ms.store(0, Ordering::SeqCst);
        shared.queue.lock().reset();
        shared.running.store(true, Ordering::SeqCst);

        let mut workers = shared.workers.lock();

        let decoder_shared = Arc::clone(shared);
        let path = media.path.clone();
        workers.push(thread::spawn(move || {
            if let Err(e) = decode_into_queue(&path, output, &decoder_shared) {
                log::error!("chime: decode error: {}", e);
                decoder_shared.failed.store(true, Ordering::SeqCst);
            }
            decoder_shared.queue.lock().finished = true;
        }));

        let render_shared = Arc::clone(shared);
        let notifier = media.notifier;
        workers.push(thread::spawn(move || {
            let natural_end = match render(&render_shared, output) {
                Ok(natural_end) => natural_end,
                Err(e) => {
                    log::error!("chime: output error: {}", e);
                    render_shared.failed.store(true, Ordering::SeqCst);
                    render_shared.halt.store(true, Ordering::SeqCst);
                    false
                }
            };
            render_shared.running.store(false, Ordering::SeqCst);

            if natural_end {
                let shared = Arc::clone(&render_shared);
                thread::spawn(move || {
                    notifier.iteration_complete_if(|| {
                        shared.session.load(Ordering::SeqCst) == session
                    });
                });
            }
        }));

        Ok(())
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.halt_workers();
    }
}

impl SoundBackend for NativeBackend {
    fn load(&self, path: &Path, notifier: IterationNotifier) -> BackendResult<()> {
        self.halt_workers();
        let info = probe_media(path)?;
        log::info!(
            "chime: loaded {} ({}Hz, {}ch)",
            path.display(),
            info.sample_rate,
            info.channels
        );
        *self.shared.media.lock() = Some(LoadedMedia {
            path: path.to_path_buf(),
            info,
            notifier,
        });
        Ok(())
    }

    fn unload(&self) -> BackendResult<()> {
        self.halt_workers();
        *self.shared.media.lock() = None;
        Ok(())
    }

    fn start(&self) -> BackendResult<()> {
        let media = self
            .shared
            .media
            .lock()
            .clone()
            .ok_or(BackendError::NotLoaded)?;

        if self.shared.running.load(Ordering::SeqCst) {
            self.shared.paused.store(false, Ordering::SeqCst);
            return Ok(());
        }

        self.halt_workers();
        self.spawn_session(media)
    }

    fn pause(&self) -> BackendResult<()> {
        self.shared.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> BackendResult<()> {
        self.halt_workers();
        self.shared.position_ms.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f64) {
        self.shared.volume.store(volume.to_bits(), Ordering::SeqCst);
    }

    fn volume(&self) -> f64 {
        f64::from_bits(self.shared.volume.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

fn decode_into_queue(path: &Path, output: OutputFormat, shared: &Shared) -> WorkerResult<()> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mut format = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())?
        .format;

    let track = format.default_track().ok_or("no default track")?;
    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut resampler = Resampler::new(source_rate, output.sample_rate, output.channels);

    loop {
        if shared.halt.load(Ordering::SeqCst) {
            return Ok(());
        }
        while shared.paused.load(Ordering::SeqCst) {
            if shared.halt.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("chime: skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        let mut buf = SampleBuffer::<f32>::new(frames as u64, spec);
        buf.copy_interleaved_ref(decoded);

        let remixed = remix(buf.samples(), spec.channels.count() as u16, output.channels);
        let samples = resampler.process(&remixed);

        // Back-pressure while the queue is full
        loop {
            {
                let mut queue = shared.queue.lock();
                if queue.room() >= samples.len() {
                    queue.push(&samples);
                    break;
                }
            }
            if shared.halt.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Drive the output stream. Returns true when the media ran out on its own.
fn render(shared: &Arc<Shared>, output: OutputFormat) -> WorkerResult<bool> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or("no output device")?;
    let config = cpal::StreamConfig {
        channels: output.channels,
        sample_rate: cpal::SampleRate(output.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_shared = Arc::clone(shared);
    let mut played: u64 = 0;
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if cb_shared.paused.load(Ordering::SeqCst) {
                data.fill(0.0);
                return;
            }
            played += cb_shared.queue.lock().pull(data) as u64;
            cb_shared
                .position_ms
                .store(output.samples_to_ms(played), Ordering::SeqCst);
            let gain = f64::from_bits(cb_shared.volume.load(Ordering::SeqCst)) as f32;
            for s in data.iter_mut() {
                *s *= gain;
            }
        },
        |err| log::error!("chime: cpal error: {}", err),
        None,
    )?;
    stream.play()?;

    loop {
        thread::sleep(Duration::from_millis(25));
        if shared.halt.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let drained = {
            let queue = shared.queue.lock();
            queue.finished && queue.is_empty() && !shared.paused.load(Ordering::SeqCst)
        };
        if drained {
            return Ok(!shared.failed.load(Ordering::SeqCst));
        }
    }
}

/// Use the track's own format when the device takes it, else the device default.
fn select_output(info: &MediaInfo) -> BackendResult<OutputFormat> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| BackendError::Device("no output device".into()))?;

    let takes_track_format = device
        .supported_output_configs()
        .map(|mut configs| {
            configs.any(|range| {
                range.sample_format() == cpal::SampleFormat::F32
                    && range.channels() == info.channels
                    && range.min_sample_rate().0 <= info.sample_rate
                    && range.max_sample_rate().0 >= info.sample_rate
            })
        })
        .unwrap_or(false);
    if takes_track_format {
        return Ok(OutputFormat {
            sample_rate: info.sample_rate,
            channels: info.channels,
        });
    }

    let default = device
        .default_output_config()
        .map_err(|e| BackendError::Device(e.to_string()))?;
    if default.sample_format() != cpal::SampleFormat::F32 {
        return Err(BackendError::Device(format!(
            "device does not support f32 output (got {:?})",
            default.sample_format()
        )));
    }
    Ok(OutputFormat {
        sample_rate: default.sample_rate().0,
        channels: default.channels(),
    })
}

// ---------------------------------------------------------------------------
// Sample plumbing
// ---------------------------------------------------------------------------

/// Bounded FIFO between decoder and output callback.
struct SampleQueue {
    samples: VecDeque<f32>,
    capacity: usize,
    /// Decoder has pushed its last sample.
    finished: bool,
}

impl SampleQueue {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            finished: false,
        }
    }

    fn room(&self) -> usize {
        self.capacity.saturating_sub(self.samples.len())
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends what fits; the rest is dropped.
    fn push(&mut self, samples: &[f32]) {
        let n = samples.len().min(self.room());
        self.samples.extend(&samples[..n]);
    }

    /// Fill `out`, padding with silence. Returns samples taken.
    fn pull(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.samples.len());
        for (dst, src) in out.iter_mut().zip(self.samples.drain(..n)) {
            *dst = src;
        }
        out[n..].fill(0.0);
        n
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.finished = false;
    }
}

/// Linear interpolation across chunk boundaries.
struct Resampler {
    /// Source frames advanced per output frame.
    step: f64,
    pos: f64,
    channels: usize,
    /// Last frame of the previous chunk.
    carry: Option<Vec<f32>>,
}

impl Resampler {
    fn new(source_rate: u32, target_rate: u32, channels: u16) -> Self {
        Self {
            step: f64::from(source_rate.max(1)) / f64::from(target_rate.max(1)),
            pos: 0.0,
            channels: usize::from(channels.max(1)),
            carry: None,
        }
    }

    fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < 1e-9
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return Vec::new();
        }

        // Virtual frame 0 is the carried frame, frame i is input frame i-1
        let carry = self
            .carry
            .take()
            .unwrap_or_else(|| input[..ch].to_vec());
        let frame = |i: usize, c: usize| {
            if i == 0 {
                carry[c]
            } else {
                input[(i - 1) * ch + c]
            }
        };

        let mut out = Vec::with_capacity((frames as f64 / self.step).ceil() as usize * ch);
        while self.pos + 1.0 < (frames + 1) as f64 {
            let i = self.pos as usize;
            let frac = (self.pos - i as f64) as f32;
            for c in 0..ch {
                let a = frame(i, c);
                let b = frame(i + 1, c);
                out.push(a + (b - a) * frac);
            }
            self.pos += self.step;
        }

        self.pos -= frames as f64;
        self.carry = Some(input[(frames - 1) * ch..frames * ch].to_vec());
        out
    }
}

/// Convert interleaved samples between channel counts.
///
/// Mono fans out to every channel, many-to-mono averages, anything else
/// copies the shared channels and zero-fills the rest.
fn remix(src: &[f32], src_ch: u16, dst_ch: u16) -> Vec<f32> {
    let (src_ch, dst_ch) = (usize::from(src_ch.max(1)), usize::from(dst_ch.max(1)));
    if src_ch == dst_ch {
        return src.to_vec();
    }

    let frames = src.len() / src_ch;
    let mut out = Vec::with_capacity(frames * dst_ch);
    for frame in src.chunks_exact(src_ch) {
        if src_ch == 1 {
            out.extend(std::iter::repeat(frame[0]).take(dst_ch));
        } else if dst_ch == 1 {
            out.push(frame.iter().sum::<f32>() / src_ch as f32);
        } else {
            let shared = src_ch.min(dst_ch);
            out.extend_from_slice(&frame[..shared]);
            out.extend(std::iter::repeat(0.0).take(dst_ch - shared));
        }
    }
    out
}
