use std::fs::{self, File};
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::CombineError;

/// Anything smaller is an empty download or an error page, never audio.
pub const MIN_ARTIFACT_BYTES: u64 = 1024;

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Decides whether a file on disk may be surfaced as an artifact.
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    pub min_bytes: u64,
    /// When false the size check alone is authoritative.
    pub decode_probe: bool,
}

impl Default for ArtifactValidator {
    fn default() -> Self {
        Self {
            min_bytes: MIN_ARTIFACT_BYTES,
            decode_probe: true,
        }
    }
}

impl ArtifactValidator {
    pub fn is_valid(&self, path: &Path) -> bool {
        let size = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return false,
        };
        if size < self.min_bytes {
            debug!("{} is only {} bytes", path.display(), size);
            return false;
        }
        if self.decode_probe && !probe_decodable(path) {
            debug!("{} failed the decode probe", path.display());
            return false;
        }
        true
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, CombineError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(path, format!("probe: {}", e)))?;
    Ok(probed.format)
}

fn decode_err(path: &Path, reason: String) -> CombineError {
    CombineError::Decode {
        path: path.to_path_buf(),
        reason,
    }
}

/// Light decode: the container must probe and its first packet must decode.
pub fn probe_decodable(path: &Path) -> bool {
    let Ok(mut format) = open_format(path) else {
        return false;
    };
    let Some(track) = format.default_track() else {
        return false;
    };
    let track_id = track.id;
    let Ok(mut decoder) =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())
    else {
        return false;
    };
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => return false,
        };
        if packet.track_id() != track_id {
            continue;
        }
        return match decoder.decode(&packet) {
            Ok(decoded) => decoded.frames() > 0,
            Err(_) => false,
        };
    }
}

/// Interleaved 32-bit float PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmAudio {
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Converts to the given layout: channels are duplicated or averaged and the
    /// rate is changed with a windowed-sinc resampler.
    pub fn convert(self, sample_rate: u32, channels: u16) -> Result<PcmAudio, CombineError> {
        let mut audio = self;
        if audio.channels != channels {
            audio = audio.remix(channels);
        }
        if audio.sample_rate != sample_rate {
            audio = audio.resample(sample_rate)?;
        }
        Ok(audio)
    }

    fn remix(self, channels: u16) -> PcmAudio {
        let from = self.channels.max(1) as usize;
        let to = channels.max(1) as usize;
        let mut samples = Vec::with_capacity(self.frames() * to);
        for frame in self.samples.chunks(from) {
            let mono = frame.iter().sum::<f32>() / from as f32;
            for c in 0..to {
                // keep the original channel when it exists, otherwise use the mixdown
                let value = if to > 1 && c < frame.len().min(from) && from > 1 {
                    frame[c]
                } else {
                    mono
                };
                samples.push(value);
            }
        }
        PcmAudio {
            sample_rate: self.sample_rate,
            channels,
            samples,
        }
    }

    fn resample(self, sample_rate: u32) -> Result<PcmAudio, CombineError> {
        let channels = self.channels.max(1) as usize;
        let in_frames = self.frames();
        if in_frames == 0 {
            return Ok(PcmAudio::empty(sample_rate, self.channels));
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = sample_rate as f64 / self.sample_rate as f64;
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, channels)
            .map_err(|e| CombineError::Resample(format!("init: {}", e)))?;

        let planar: Vec<Vec<f32>> = (0..channels)
            .map(|c| self.samples.iter().skip(c).step_by(channels).copied().collect())
            .collect();
        let delay = resampler.output_delay();
        let expected = (in_frames as f64 * ratio).round() as usize;
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

        // zero chunks past the end flush the filter tail
        let mut pos = 0;
        while output[0].len() < expected + delay {
            let input: Vec<Vec<f32>> = planar
                .iter()
                .map(|ch| {
                    let end = (pos + RESAMPLE_CHUNK).min(in_frames);
                    let mut chunk = ch[pos.min(end)..end].to_vec();
                    chunk.resize(RESAMPLE_CHUNK, 0.0);
                    chunk
                })
                .collect();
            let result = resampler
                .process(&input[..], None)
                .map_err(|e| CombineError::Resample(e.to_string()))?;
            for (out, res) in output.iter_mut().zip(result) {
                out.extend_from_slice(&res);
            }
            pos += RESAMPLE_CHUNK;
        }

        let mut samples = Vec::with_capacity(expected * channels);
        for f in delay..delay + expected {
            for ch in &output {
                samples.push(ch[f]);
            }
        }
        Ok(PcmAudio {
            sample_rate,
            channels: self.channels,
            samples,
        })
    }

    /// Appends `other` (already in this layout). With a crossfade the tail of
    /// `self` and the head of `other` overlap, fading one out and the other in.
    pub fn append(&mut self, other: &PcmAudio, crossfade_ms: u32) {
        let channels = self.channels.max(1) as usize;
        let wanted = (crossfade_ms as u64 * self.sample_rate as u64 / 1000) as usize;
        let overlap = wanted.min(self.frames()).min(other.frames());
        if overlap == 0 {
            self.samples.extend_from_slice(&other.samples);
            return;
        }
        let start = self.samples.len() - overlap * channels;
        for f in 0..overlap {
            let fade_in = (f + 1) as f32 / (overlap + 1) as f32;
            let fade_out = 1.0 - fade_in;
            for c in 0..channels {
                let idx = f * channels + c;
                let mixed = self.samples[start + idx] * fade_out + other.samples[idx] * fade_in;
                self.samples[start + idx] = mixed;
            }
        }
        self.samples
            .extend_from_slice(&other.samples[overlap * channels..]);
    }
}

/// Decodes a whole file to PCM with symphonia.
pub fn decode_pcm(path: &Path) -> Result<PcmAudio, CombineError> {
    let mut format = open_format(path)?;
    let track = format
        .default_track()
        .ok_or_else(|| decode_err(path, "no audio track found".to_string()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(path, format!("codec: {}", e)))?;

    let mut layout: Option<(u32, u16)> = None;
    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(path, format!("packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(decode_err(path, format!("decode: {}", e))),
        };
        let spec = *decoded.spec();
        if decoded.frames() == 0 {
            continue;
        }
        layout.get_or_insert((spec.rate, spec.channels.count() as u16));
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    let (sample_rate, channels) =
        layout.ok_or_else(|| decode_err(path, "no audio samples decoded".to_string()))?;
    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        frames = samples.len() / channels.max(1) as usize,
        "Decoded audio"
    );
    Ok(PcmAudio {
        sample_rate,
        channels,
        samples,
    })
}

/// Writes 16-bit PCM WAV.
pub fn write_wav(path: &Path, audio: &PcmAudio) -> Result<PathBuf, CombineError> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for s in &audio.samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(path.to_path_buf())
}
