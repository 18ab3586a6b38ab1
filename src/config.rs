//! Configuration loaded from the command line and environment variables

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;

use crate::sdr::SdrConfig;

/// Rate the FM discriminator runs at (broadcast FM channel width)
pub const INTERMEDIATE_RATE: u32 = 240_000;

/// Rate of the PCM stream sent to the player and the recording
pub const AUDIO_RATE: u32 = 48_000;

/// IQ blocks delivered per second of capture
pub const BLOCKS_PER_SECOND: u32 = 16;

/// Default player command: raw S16_LE mono PCM on stdin
pub const DEFAULT_PLAYER: &str = "aplay -q -t raw -f S16_LE -c 1 -r 48000 -";

/// Configuration errors, all detected before the device is opened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroRate { name: &'static str },

    #[error("cannot decimate {from} Hz to {to} Hz: not an integer ratio")]
    NonIntegerRatio { from: u32, to: u32 },

    #[error("invalid gain '{0}': expected 'auto' or a value in dB")]
    InvalidGain(String),
}

/// Tuner gain selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    Auto,
    /// Gain in tenths of dB (e.g., 496 = 49.6 dB)
    Manual(i32),
}

impl FromStr for GainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(GainMode::Auto);
        }
        match s.parse::<f32>() {
            Ok(db) if db.is_finite() && db >= 0.0 => Ok(GainMode::Manual((db * 10.0).round() as i32)),
            _ => Err(ConfigError::InvalidGain(s.to_string())),
        }
    }
}

impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainMode::Auto => write!(f, "auto"),
            GainMode::Manual(tenths) => write!(f, "{:.1} dB", *tenths as f32 / 10.0),
        }
    }
}

/// Listen to broadcast FM with an RTL-SDR
#[derive(Parser, Debug)]
#[command(name = "fm-capture")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Frequency to listen to, in Hertz
    #[arg(short, long, env = "FM_FREQ", default_value_t = 93_900_000)]
    pub freq: u32,

    /// Store audio to a WAV file on exit
    #[arg(short, long, env = "FM_SAVE")]
    pub save: bool,

    /// Capture sample rate in Hz (integer multiple of 240000)
    #[arg(long, env = "FM_SAMPLE_RATE", default_value_t = 240_000)]
    pub sample_rate: u32,

    /// Tuner gain: "auto" or a value in dB
    #[arg(short, long, env = "DEVICE_GAIN", default_value = "auto")]
    pub gain: GainMode,

    /// Frequency correction in PPM
    #[arg(short, long, env = "PPM_ERROR", default_value_t = 40, allow_hyphen_values = true)]
    pub ppm: i32,

    /// RTL-SDR device index
    #[arg(short, long, env = "DEVICE_INDEX", default_value_t = 0)]
    pub device_index: u32,

    /// Path to the rtl_sdr executable
    #[arg(long, env = "RTL_SDR_PATH", default_value = "rtl_sdr")]
    pub rtl_sdr_path: PathBuf,

    /// Player command reading raw S16_LE mono 48 kHz PCM from stdin
    #[arg(long, env = "FM_PLAYER", default_value = DEFAULT_PLAYER)]
    pub player: String,

    /// Disable live audio output
    #[arg(long)]
    pub no_audio: bool,

    /// Directory for recordings
    #[arg(short, long, env = "FM_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Capture configuration, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub center_frequency_hz: u32,
    pub capture_sample_rate_hz: u32,
    pub gain_mode: GainMode,
    pub frequency_error_ppm: i32,
    pub record_to_file: bool,

    /// RTL-SDR device index
    pub device_index: u32,

    /// Path to rtl_sdr executable
    pub rtl_sdr_path: PathBuf,

    /// Audio player command line
    pub player: String,

    pub audio_enabled: bool,

    /// Where recordings are written
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            center_frequency_hz: 93_900_000,
            capture_sample_rate_hz: INTERMEDIATE_RATE,
            gain_mode: GainMode::Auto,
            frequency_error_ppm: 40,
            record_to_file: false,
            device_index: 0,
            rtl_sdr_path: PathBuf::from("rtl_sdr"),
            player: DEFAULT_PLAYER.to_string(),
            audio_enabled: true,
            output_dir: PathBuf::from("."),
        }
    }
}

impl From<Args> for CaptureConfig {
    fn from(args: Args) -> Self {
        Self {
            center_frequency_hz: args.freq,
            capture_sample_rate_hz: args.sample_rate,
            gain_mode: args.gain,
            frequency_error_ppm: args.ppm,
            record_to_file: args.save,
            device_index: args.device_index,
            rtl_sdr_path: args.rtl_sdr_path,
            player: args.player,
            audio_enabled: !args.no_audio,
            output_dir: args.output_dir,
        }
    }
}

impl CaptureConfig {
    /// Check the decimation chain and return the factors for both stages
    pub fn validate(&self) -> Result<DecimationPlan, ConfigError> {
        DecimationPlan::new(self.capture_sample_rate_hz, INTERMEDIATE_RATE, AUDIO_RATE)
    }

    /// IQ samples per capture callback
    pub fn block_length(&self) -> usize {
        (self.capture_sample_rate_hz / BLOCKS_PER_SECOND) as usize
    }

    pub fn sdr_config(&self) -> SdrConfig {
        SdrConfig {
            device_index: self.device_index,
            center_freq: self.center_frequency_hz,
            sample_rate: self.capture_sample_rate_hz,
            gain: self.gain_mode,
            ppm_error: self.frequency_error_ppm,
            rtl_sdr_path: self.rtl_sdr_path.to_string_lossy().to_string(),
        }
    }
}

/// Validated rates and integer factors of the two decimation stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationPlan {
    pub capture_rate: u32,
    pub intermediate_rate: u32,
    pub audio_rate: u32,
    pub stage1_factor: usize,
    pub stage2_factor: usize,
}

impl DecimationPlan {
    pub fn new(capture_rate: u32, intermediate_rate: u32, audio_rate: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            capture_rate,
            intermediate_rate,
            audio_rate,
            stage1_factor: integer_ratio(capture_rate, intermediate_rate, "capture sample rate")?,
            stage2_factor: integer_ratio(intermediate_rate, audio_rate, "intermediate rate")?,
        })
    }
}

fn integer_ratio(from: u32, to: u32, name: &'static str) -> Result<usize, ConfigError> {
    if from == 0 {
        return Err(ConfigError::ZeroRate { name });
    }
    if to == 0 {
        return Err(ConfigError::ZeroRate { name: "target rate" });
    }
    if from % to != 0 {
        return Err(ConfigError::NonIntegerRatio { from, to });
    }
    Ok((from / to) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_default_plan() {
        let plan = CaptureConfig::default().validate().unwrap();
        assert_eq!(plan.stage1_factor, 1);
        assert_eq!(plan.stage2_factor, 5);
        assert_eq!(plan.audio_rate, 48_000);
    }

    #[test]
    fn test_oversampled_capture() {
        let config = CaptureConfig {
            capture_sample_rate_hz: 960_000,
            ..Default::default()
        };
        let plan = config.validate().unwrap();
        assert_eq!(plan.stage1_factor, 4);
        assert_eq!(plan.stage2_factor, 5);
        assert_eq!(config.block_length(), 60_000);
    }

    #[test]
    fn test_non_integer_ratio_rejected() {
        let config = CaptureConfig {
            capture_sample_rate_hz: 250_000,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonIntegerRatio { from: 250_000, to: 240_000 })
        );

        // Slower than the intermediate rate can't be decimated either
        let config = CaptureConfig {
            capture_sample_rate_hz: 120_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = CaptureConfig {
            capture_sample_rate_hz: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRate { .. })));
        assert!(DecimationPlan::new(240_000, 240_000, 0).is_err());
    }

    #[test]
    fn test_block_length() {
        assert_eq!(CaptureConfig::default().block_length(), 15_000);
    }

    #[test]
    fn test_gain_parse() {
        assert_eq!("auto".parse::<GainMode>(), Ok(GainMode::Auto));
        assert_eq!("AUTO".parse::<GainMode>(), Ok(GainMode::Auto));
        assert_eq!("49.6".parse::<GainMode>(), Ok(GainMode::Manual(496)));
        assert_eq!("0".parse::<GainMode>(), Ok(GainMode::Manual(0)));
        assert!("loud".parse::<GainMode>().is_err());
        assert!("-3".parse::<GainMode>().is_err());
    }

    fn declared_default(id: &str) -> String {
        Args::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_default_values().first())
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn test_args_defaults() {
        // Read from the command definition so FM_* variables in the
        // environment don't leak in
        let config = CaptureConfig::default();
        assert_eq!(declared_default("freq"), config.center_frequency_hz.to_string());
        assert_eq!(declared_default("sample_rate"), config.capture_sample_rate_hz.to_string());
        assert_eq!(declared_default("gain").parse::<GainMode>(), Ok(config.gain_mode));
        assert_eq!(declared_default("ppm"), config.frequency_error_ppm.to_string());
        assert_eq!(declared_default("device_index"), config.device_index.to_string());
        assert_eq!(declared_default("rtl_sdr_path"), "rtl_sdr");
        assert_eq!(declared_default("player"), DEFAULT_PLAYER);
        assert_eq!(declared_default("output_dir"), ".");

        assert_eq!(config.center_frequency_hz, 93_900_000);
        assert_eq!(config.frequency_error_ppm, 40);
        assert!(!config.record_to_file);
        assert!(config.audio_enabled);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "fm-capture",
            "--freq",
            "101100000",
            "--save",
            "--gain",
            "20.7",
            "--ppm",
            "-12",
            "--no-audio",
        ])
        .unwrap();
        let config = CaptureConfig::from(args);
        assert_eq!(config.center_frequency_hz, 101_100_000);
        assert!(config.record_to_file);
        assert_eq!(config.gain_mode, GainMode::Manual(207));
        assert_eq!(config.frequency_error_ppm, -12);
        assert!(!config.audio_enabled);
    }
}
