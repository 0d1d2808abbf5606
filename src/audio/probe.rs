use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{MediaError, Result};

/// Reads the playback duration of an audio file
pub struct AudioProbe;

impl AudioProbe {
    /// Duration in seconds. WAV goes through hound, everything else through
    /// symphonia.
    pub fn duration<P: AsRef<Path>>(path: P) -> Result<f64> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        let duration = match extension.as_str() {
            "wav" => Self::wav_duration(path).or_else(|_| Self::symphonia_duration(path))?,
            _ => Self::symphonia_duration(path)?,
        };
        debug!("Audio {:?}: {:.2}s", path, duration);
        Ok(duration)
    }

    fn wav_duration(path: &Path) -> Result<f64> {
        let reader = hound::WavReader::open(path).map_err(|_| MediaError::AudioUnreadable {
            path: path.to_path_buf(),
        })?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(MediaError::AudioUnreadable { path: path.to_path_buf() }.into());
        }
        // duration() counts samples per channel
        Ok(reader.duration() as f64 / spec.sample_rate as f64)
    }

    fn symphonia_duration(path: &Path) -> Result<f64> {
        let unreadable = || MediaError::AudioUnreadable { path: path.to_path_buf() };

        let file = File::open(path).map_err(|_| unreadable())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| unreadable())?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(unreadable)?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.ok_or_else(unreadable)?;

        if let Some(frames) = track.codec_params.n_frames {
            return Ok(frames as f64 / sample_rate as f64);
        }

        // No frame count in the header: add up packet durations instead
        let time_base = track.codec_params.time_base;
        let mut total_ts: u64 = 0;
        loop {
            match format.next_packet() {
                Ok(packet) if packet.track_id() == track_id => total_ts += packet.dur,
                Ok(_) => {}
                Err(SymphoniaError::IoError(_)) => break,
                Err(_) => return Err(unreadable().into()),
            }
        }

        Ok(match time_base {
            Some(tb) => {
                let time = tb.calc_time(total_ts);
                time.seconds as f64 + time.frac
            }
            None => total_ts as f64 / sample_rate as f64,
        })
    }
}
