//! Audio I/O adapter (C2): header probing, ranged reads and atomic
//! WAV writes. The adapter never retries silently — every failure surfaces
//! to the caller as a typed [`auralis_core::Error`].

use auralis_core::{Error, Result};
use std::path::Path;

/// `hound::Error::IoError` means the file itself is missing/unreadable;
/// every other variant is a format problem in bytes that were read fine.
fn hound_err(path: &Path, e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io_err) => Error::Io(io_err),
        other => Error::decode(format!("{}: {other}", path.display())),
    }
}

/// Header-only metadata returned by [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_count: u64,
}

/// WAV sample format for [`write_wav`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavSubtype {
    Pcm16,
    Pcm24,
}

/// Reads just the header of a WAV file.
pub fn open(path: &Path) -> Result<AudioHeader> {
    let reader = hound::WavReader::open(path).map_err(|e| hound_err(path, e))?;
    let spec = reader.spec();
    Ok(AudioHeader {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frame_count: reader.duration() as u64,
    })
}

/// Reads `[start_frame, start_frame + n_frames)` as an interleaved f32
/// buffer. Returns fewer frames than requested if the file is shorter than
/// the requested window (not an error); `start_frame >= frame_count` is an
/// error. When `downmix_to_mono` is set, the returned buffer (and header)
/// collapse every channel into one by averaging; otherwise the file's own
/// channel layout is preserved.
pub fn read_range(
    path: &Path,
    start_frame: u64,
    n_frames: u64,
    downmix_to_mono: bool,
) -> Result<(Vec<f32>, AudioHeader)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| hound_err(path, e))?;
    let spec = reader.spec();
    let file_channels = spec.channels;
    let header = AudioHeader {
        sample_rate: spec.sample_rate,
        channels: if downmix_to_mono { 1 } else { file_channels },
        frame_count: reader.duration() as u64,
    };

    if start_frame >= header.frame_count {
        return Err(Error::decode(format!(
            "read_range start_frame {start_frame} >= frame_count {}",
            header.frame_count
        )));
    }

    let channels = file_channels as u64;
    reader
       .seek(start_frame as u32)
       .map_err(|e| hound_err(path, e))?;

    let available_frames = header.frame_count - start_frame;
    let frames_to_read = n_frames.min(available_frames);
    let samples_to_read = (frames_to_read * channels) as usize;

    let mut raw = Vec::with_capacity(samples_to_read);
    let samples = reader.samples::<i32>();
    let bits = spec.bits_per_sample;
    let max_val = (1i64 << (bits - 1)) as f32;

    for sample in samples.take(samples_to_read) {
        let s = sample.map_err(|e| hound_err(path, e))?;
        raw.push(s as f32 / max_val);
    }

    let out = if downmix_to_mono && file_channels > 1 {
        downmix(&raw, file_channels)
    } else {
        raw
    };

    Ok((out, header))
}

fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels as usize;
    interleaved
       .chunks_exact(channels)
       .map(|frame| frame.iter().sum::<f32>() / channels as f32)
       .collect()
}

/// Writes interleaved f32 samples as a WAV file atomically: write to a
/// sibling temp file, fsync, then rename over the destination. Never leaves
/// a half-written file visible at `path`.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    subtype: WavSubtype,
) -> Result<()> {
    let bits_per_sample = match subtype {
        WavSubtype::Pcm16 => 16,
        WavSubtype::Pcm24 => 24,
    };
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };

    let tmp_path = sibling_temp_path(path);
    {
        let mut writer = hound::WavWriter::create(&tmp_path, spec)
           .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        match subtype {
            WavSubtype::Pcm16 => {
                let max_val = i16::MAX as f32;
                for &s in samples {
                    let v = (s.clamp(-1.0, 1.0) * max_val) as i16;
                    writer
                       .write_sample(v)
                       .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                }
            }
            WavSubtype::Pcm24 => {
                let max_val = (1i64 << 23) as f32 - 1.0;
                for &s in samples {
                    let v = (s.clamp(-1.0, 1.0) * max_val) as i32;
                    writer
                       .write_sample(v)
                       .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                }
            }
        }
        writer
           .finalize()
           .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    }

    // fsync the temp file before the rename so a crash mid-write never
    // leaves the destination pointing at unflushed content.
    {
        let f = std::fs::File::open(&tmp_path)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn sibling_temp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
       .file_name()
       .map(|n| n.to_string_lossy().into_owned())
       .unwrap_or_else(|| "payload".to_string());
    let pid = std::process::id();
    let tmp_name = format!(".{file_name}.{pid}.tmp");
    path.with_file_name(tmp_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, frames: usize, sample_rate: u32) {
        let samples: Vec<f32> = (0..frames * 2)
           .map(|i| ((i as f32) / (frames as f32 * 2.0)) * 0.5)
           .collect();
        write_wav(path, &samples, sample_rate, 2, WavSubtype::Pcm16).unwrap();
    }

    #[test]
    fn round_trips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        write_test_wav(&path, 1000, 44100);

        let header = open(&path).unwrap();
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, 2);
        assert_eq!(header.frame_count, 1000);
    }

    #[test]
    fn read_range_past_end_returns_fewer_frames_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        write_test_wav(&path, 100, 44100);

        let (samples, header) = read_range(&path, 90, 50, false).unwrap();
        assert_eq!(header.frame_count, 100);
        assert_eq!(samples.len(), 10 * 2);
    }

    #[test]
    fn read_range_starting_at_or_past_frame_count_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        write_test_wav(&path, 100, 44100);

        assert!(read_range(&path, 100, 10, false).is_err());
        assert!(read_range(&path, 150, 10, false).is_err());
    }

    #[test]
    fn read_range_downmix_collapses_to_one_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        write_test_wav(&path, 100, 44100);

        let (samples, header) = read_range(&path, 0, 100, true).unwrap();
        assert_eq!(header.channels, 1);
        assert_eq!(samples.len(), 100);
    }

    #[test]
    fn write_wav_never_leaves_a_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        write_test_wav(&path, 10, 44100);

        let mut entries: Vec<_> = std::fs::read_dir(dir.path())
           .unwrap()
           .map(|e| e.unwrap().file_name())
           .collect();
        entries.sort();
        assert_eq!(entries, vec![std::ffi::OsString::from("t.wav")]);
    }
}
