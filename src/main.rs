use std::env;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use soundstream::{load_wav, EngineConfig, MemoryStream, PlaybackVoice, StreamEngine, StreamState};

const TONE_SAMPLE_RATE: u32 = 44_100;
const TONE_FREQUENCY_HZ: f32 = 440.0;
const TONE_SECONDS: u32 = 2;
const STATUS_INTERVAL: Duration = Duration::from_millis(250);

struct Options {
    file: Option<String>,
    looping: bool,
    seconds: Option<f32>,
    config: EngineConfig,
}

fn usage() {
    eprintln!(
        "Usage:\n  soundstream-play [--loop] [--seconds N] [--config FILE.json] [--low-latency] [FILE.wav]\n\nFlags:\n  --loop               Loop the stream until the time limit\n  --seconds N          Stop after N seconds (default: end of stream, 10 s when looping)\n  --config FILE        Engine configuration as JSON\n  --low-latency        Use the low-latency engine preset\n  -h, --help           Show this help\n\nWithout a file a {TONE_SECONDS} s sine tone is played.\n"
    );
}

fn parse_args() -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        file: None,
        looping: false,
        seconds: None,
        config: EngineConfig::default(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--loop" => options.looping = true,
            "--low-latency" => options.config = EngineConfig::low_latency(),
            "--seconds" => {
                let value = args.next().context("--seconds requires a number")?;
                let seconds: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid --seconds value '{value}'"))?;
                if !(seconds.is_finite() && seconds > 0.0) {
                    bail!("--seconds must be positive");
                }
                options.seconds = Some(seconds);
            }
            "--config" => {
                let path = args.next().context("--config requires a file")?;
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config '{path}'"))?;
                options.config = EngineConfig::from_json(&json)
                    .with_context(|| format!("Invalid config '{path}'"))?;
            }
            _ if arg.starts_with('-') => bail!("Unknown flag: {arg}"),
            _ => options.file = Some(arg),
        }
    }
    Ok(Some(options))
}

fn sine_tone() -> MemoryStream {
    let frames = TONE_SAMPLE_RATE * TONE_SECONDS;
    let step = std::f32::consts::TAU * TONE_FREQUENCY_HZ / TONE_SAMPLE_RATE as f32;
    let samples: Vec<i16> = (0..frames)
        .map(|i| ((i as f32 * step).sin() * 0.3 * i16::MAX as f32) as i16)
        .collect();
    MemoryStream::new(samples, 1, TONE_SAMPLE_RATE)
}

#[cfg(feature = "rodio-output")]
fn open_voice() -> anyhow::Result<(Arc<dyn PlaybackVoice>, Box<dyn std::any::Any>)> {
    let device = soundstream::RodioDevice::open_default()?;
    let voice = device.create_voice()?;
    println!("Output: default audio device");
    let voice: Arc<dyn PlaybackVoice> = Arc::new(voice);
    let device: Box<dyn std::any::Any> = Box::new(device);
    Ok((voice, device))
}

#[cfg(not(feature = "rodio-output"))]
fn open_voice() -> anyhow::Result<(Arc<dyn PlaybackVoice>, Box<dyn std::any::Any>)> {
    println!("Output: simulated (rebuild with --features rodio-output for sound)");
    let voice: Arc<dyn PlaybackVoice> = Arc::new(soundstream::SimulatedVoice::realtime());
    let device: Box<dyn std::any::Any> = Box::new(());
    Ok((voice, device))
}

fn run(options: Options) -> anyhow::Result<()> {
    let source = match &options.file {
        Some(path) => {
            println!("Loading file: {path}");
            load_wav(path)?
        }
        None => {
            println!("No file given, playing a {TONE_FREQUENCY_HZ} Hz tone");
            sine_tone()
        }
    };

    let channels = source.channel_count();
    let sample_rate = source.sample_rate();
    let duration = source.duration();
    println!(
        "Stream: {channels} ch @ {sample_rate} Hz, {:.2} s, {} buffers every {} ms\n",
        duration.as_secs_f32(),
        options.config.buffer_count,
        options.config.processing_interval_ms
    );

    // The device handle must outlive the engine
    let (voice, _device) = open_voice()?;
    let engine = StreamEngine::with_config(voice, Box::new(source), options.config)?;
    engine.initialize(channels, sample_rate)?;
    engine.set_loop(options.looping);
    engine.play()?;

    let limit = match (options.seconds, options.looping) {
        (Some(seconds), _) => Some(Duration::from_secs_f32(seconds)),
        (None, true) => Some(Duration::from_secs(10)),
        (None, false) => None,
    };

    let started = Instant::now();
    loop {
        thread::sleep(STATUS_INTERVAL);
        let status = engine.get_status()?;
        let offset = engine.get_playing_offset()?;
        println!(
            "[{:>6.2}s] {:?} at {:.2}s",
            started.elapsed().as_secs_f32(),
            status,
            offset.as_secs_f32()
        );

        if status == StreamState::Stopped {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    engine.stop()?;
    println!("\nDone.");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("soundstream - continuous audio streaming demo");
    println!("=============================================\n");

    match parse_args() {
        Ok(Some(options)) => run(options),
        Ok(None) => {
            usage();
            Ok(())
        }
        Err(err) => {
            usage();
            Err(err)
        }
    }
}
