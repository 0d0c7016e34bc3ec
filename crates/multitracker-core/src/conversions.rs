//! Time and level conversions

/// Format seconds as MM:SS.cc
pub fn format_time(secs: f64) -> String {
    let centis = (secs.max(0.0) * 100.0).floor() as u64;
    let mins = centis / 6000;
    let whole = (centis / 100) % 60;
    format!("{:02}:{:02}.{:02}", mins, whole, centis % 100)
}

pub fn beats_to_time(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

pub fn time_to_beats(secs: f64, bpm: f64) -> f64 {
    secs * bpm / 60.0
}

/// Snap to the nearest grid line; `subdivision` counts notes per bar of 4/4
/// (16 = sixteenth notes).
pub fn quantize_time(secs: f64, bpm: f64, subdivision: u32) -> f64 {
    let step = 60.0 / bpm / (subdivision as f64 / 4.0);
    (secs / step).round() * step
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Gain in dB, floored at -100 dB for silence
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-5).log10()
}

pub fn time_to_samples(secs: f64, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f64).floor() as usize
}

pub fn samples_to_time(samples: usize, sample_rate: u32) -> f64 {
    samples as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00.00");
        assert_eq!(format_time(59.999), "00:59.99");
        assert_eq!(format_time(754.5), "12:34.50");
    }

    #[test]
    fn test_quantize_to_sixteenths() {
        // 120 BPM sixteenth = 0.125 s
        assert!((quantize_time(0.30, 120.0, 16) - 0.25).abs() < 1e-9);
        assert!((quantize_time(0.32, 120.0, 16) - 0.375).abs() < 1e-9);
        assert!((quantize_time(0.30, 120.0, 4) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_beats_and_time() {
        assert_eq!(beats_to_time(8.0, 120.0), 4.0);
        assert_eq!(time_to_beats(4.0, 120.0), 8.0);
    }

    #[test]
    fn test_db_conversions() {
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((gain_to_db(1.0)).abs() < 1e-6);
        assert!((gain_to_db(0.0) + 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_sample_conversions() {
        assert_eq!(time_to_samples(1.5, 44100), 66150);
        assert_eq!(time_to_samples(-1.0, 44100), 0);
        assert_eq!(samples_to_time(22050, 44100), 0.5);
    }
}
