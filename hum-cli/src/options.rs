//! Command-line options

use std::time::Duration;

use anyhow::{Context, Result, anyhow};

pub const USAGE: &str = "\
hum - sing a melody, get ABC notation

USAGE:
    hum [OPTIONS]

OPTIONS:
    --seconds <N>     Record from the microphone for N seconds (default: 10)
    --wav <FILE>      Transcribe a WAV file instead of recording
    --load <FILE>     Reload a saved session instead of recording
    --config <FILE>   Read tunables from a JSON config file (not with --load)
    --bpm <N>         Use a fixed tempo (40-240) instead of detecting one
    --no-quantize     Keep the sung timing instead of snapping to the grid
    --abc <FILE>      Write the notation to FILE
    --save <FILE>     Save the session as JSON
    -h, --help        Print this help

Set RUST_LOG=debug for pipeline diagnostics.";

const DEFAULT_SECONDS: f64 = 10.0;
/// One hour.
const MAX_SECONDS: f64 = 3600.0;

/// Where the notes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Microphone { seconds: f64 },
    Wav(String),
    Session(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub source: Source,
    pub config: Option<String>,
    pub bpm: Option<u32>,
    pub no_quantize: bool,
    pub abc_out: Option<String>,
    pub save: Option<String>,
}

impl CliOptions {
    /// Parses arguments (without the program name). `Ok(None)` means help was requested.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Option<Self>> {
        let mut args = args.into_iter();
        let mut seconds = None;
        let mut wav = None;
        let mut load = None;
        let mut options = CliOptions {
            source: Source::Microphone {
                seconds: DEFAULT_SECONDS,
            },
            config: None,
            bpm: None,
            no_quantize: false,
            abc_out: None,
            save: None,
        };

        while let Some(arg) = args.next() {
            let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("{} needs a value", name));
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--seconds" => {
                    let raw = value("--seconds")?;
                    let parsed: f64 = raw.parse().with_context(|| format!("bad --seconds '{}'", raw))?;
                    if !(parsed > 0.0 && parsed <= MAX_SECONDS) || Duration::try_from_secs_f64(parsed).is_err() {
                        return Err(anyhow!("--seconds must be between 0 and {}", MAX_SECONDS));
                    }
                    seconds = Some(parsed);
                }
                "--wav" => wav = Some(value("--wav")?),
                "--load" => load = Some(value("--load")?),
                "--config" => options.config = Some(value("--config")?),
                "--bpm" => {
                    let raw = value("--bpm")?;
                    options.bpm = Some(raw.parse().with_context(|| format!("bad --bpm '{}'", raw))?);
                }
                "--no-quantize" => options.no_quantize = true,
                "--abc" => options.abc_out = Some(value("--abc")?),
                "--save" => options.save = Some(value("--save")?),
                other => return Err(anyhow!("unknown option '{}'\n\n{}", other, USAGE)),
            }
        }

        if load.is_some() && options.config.is_some() {
            return Err(anyhow!("--config has no effect with --load; the session keeps its own settings"));
        }
        options.source = match (wav, load, seconds) {
            (Some(_), Some(_), _) => return Err(anyhow!("--wav and --load are exclusive")),
            (Some(path), None, _) => Source::Wav(path),
            (None, Some(path), _) => Source::Session(path),
            (None, None, seconds) => Source::Microphone {
                seconds: seconds.unwrap_or(DEFAULT_SECONDS),
            },
        };
        Ok(Some(options))
    }
}
