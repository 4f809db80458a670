//! iptsd entrypoint: opens the driver channel, loads per-device config, and
//! runs the single-threaded frame loop described in spec §5 — block for a
//! buffer, parse it, dispatch to the touch or stylus path, emit a report,
//! check the signal flags, repeat.

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use core_config::{Config, DeviceInfo, DEFAULT_CONFIG_DIR};
use core_protocol::{
    parse_frame, Frame, IptsHidReport, StylusReport, TouchContactReport, TouchReport, MAX_CONTACTS,
    MAX_PRESSURE, MAX_SINGLETOUCH, MAX_X, MAX_Y,
};
use core_stylus::StylusDecoder;
use core_touch::{AdvancedConfig, BasicConfig, TouchProcessor};
use core_tracking::{Cone, TouchManager};
use core_transport::{ChannelStub, DriverChannel, MmapChannel, SignalFlags, TransportError};

/// Time the heatmap path sleeps after each emitted touch report, to cap the
/// HID report rate (spec §5). Stylus paths do not throttle.
const TOUCH_REPORT_THROTTLE: Duration = Duration::from_millis(5);

#[derive(Parser, Debug)]
#[command(name = "iptsd", version, about = "IPTS userspace touch/stylus processor")]
struct Args {
    /// Path to the driver's mapped buffer ring.
    #[arg(long, default_value = "/dev/ipts/data")]
    data: PathBuf,
    /// Path to the driver's doorbell (readiness) file.
    #[arg(long, default_value = "/dev/ipts/doorbell")]
    doorbell: PathBuf,
    /// Path the driver reads HID reports back from.
    #[arg(long, default_value = "/dev/ipts/hid")]
    hid: PathBuf,
    /// Size in bytes of one ring buffer slot.
    #[arg(long, default_value_t = 1 << 16)]
    buffer_size: usize,
    /// Directory of per-device INI configuration files.
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,
    /// USB vendor ID of the probed device, hex (e.g. 04f3).
    #[arg(long, value_parser = parse_hex_u16, default_value = "04f3")]
    vendor: u16,
    /// USB product ID of the probed device, hex.
    #[arg(long, value_parser = parse_hex_u16, default_value = "0c00")]
    product: u16,
    /// Replay pre-recorded buffers from this path (one length-prefixed
    /// buffer per line of hex) instead of opening the real driver channel.
    /// Exists for local smoke-testing without hardware.
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn configure_logging() -> Result<WorkerGuard> {
    let log_dir = Path::new(".");
    let file_appender = tracing_appender::rolling::never(log_dir, "iptsd.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .init();
    Ok(guard)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

/// Everything that gets rebuilt on a `SIGUSR1` reset.
struct Pipeline {
    touch_processor: TouchProcessor,
    touch_manager: TouchManager,
    stylus_decoder: StylusDecoder,
}

impl Pipeline {
    fn new(config: &Config) -> Self {
        let touch_processor = if config.touch_advanced {
            TouchProcessor::advanced(AdvancedConfig::default())
        } else {
            TouchProcessor::basic(BasicConfig {
                pressure_threshold: config.basic_pressure,
            })
        };

        let cones = vec![Cone::new(config.cone_angle as f64, config.cone_distance as f64)];
        let touch_manager = TouchManager::new(
            MAX_CONTACTS,
            config.invert_x,
            config.invert_y,
            config.stylus_cone,
            config.touch_stability,
            config.stability_threshold,
            cones,
        );

        let stylus_decoder = StylusDecoder::new(config.invert_x, config.invert_y);

        Self {
            touch_processor,
            touch_manager,
            stylus_decoder,
        }
    }
}

fn build_touch_report(inputs: &[core_protocol::TouchInput], disable_on_palm: bool) -> TouchReport {
    if disable_on_palm && inputs.iter().any(|i| i.active && i.palm) {
        return TouchReport::default();
    }

    let mut contacts = [TouchContactReport::default(); MAX_CONTACTS];
    let mut contact_num = 0u8;
    for input in inputs.iter().filter(|i| i.active && !i.palm) {
        if contact_num as usize >= MAX_CONTACTS {
            break;
        }
        contacts[contact_num as usize] = TouchContactReport {
            touch: true,
            contact_id: input.index,
            x: (input.x.clamp(0.0, 1.0) * MAX_SINGLETOUCH as f32) as u16,
            y: (input.y.clamp(0.0, 1.0) * MAX_SINGLETOUCH as f32) as u16,
        };
        contact_num += 1;
    }

    TouchReport {
        contact_num,
        contacts,
    }
}

fn build_stylus_report(input: &core_protocol::StylusInput) -> StylusReport {
    StylusReport {
        in_range: input.proximity,
        touch: input.contact,
        side_button: input.button,
        eraser: input.rubber,
        x: (input.x.clamp(0.0, 1.0) * MAX_X as f32) as u16,
        y: (input.y.clamp(0.0, 1.0) * MAX_Y as f32) as u16,
        tip_pressure: (input.pressure.clamp(0.0, MAX_PRESSURE as f32)) as u16,
        x_tilt: 0,
        y_tilt: 0,
        scan_time: 0,
    }
}

/// Legacy (non-DFT) stylus telemetry arrives already decoded by the driver;
/// it needs no interpolation, only a clamp into the HID report's ranges.
fn legacy_stylus_report(data: &core_protocol::StylusData) -> StylusReport {
    StylusReport {
        in_range: data.proximity,
        touch: data.contact,
        side_button: data.button,
        eraser: data.rubber,
        x: data.x.min(MAX_X),
        y: data.y.min(MAX_Y),
        tip_pressure: data.pressure.min(MAX_PRESSURE),
        x_tilt: 0,
        y_tilt: 0,
        scan_time: data.timestamp,
    }
}

fn run_loop(
    channel: &mut dyn DriverChannel,
    signals: &SignalFlags,
    config: &Config,
    pipeline: &mut Pipeline,
) -> Result<()> {
    let mut stylus_active = false;

    loop {
        if signals.shutdown_requested() {
            info!(target: "runtime", "shutdown signal received, exiting");
            return Ok(());
        }
        if signals.take_reset_request() {
            info!(target: "runtime", "reset signal received, rebuilding pipeline state");
            *pipeline = Pipeline::new(config);
            stylus_active = false;
        }

        let buf = match channel.recv_buffer() {
            Ok(buf) => buf,
            Err(err) => {
                error!(target: "transport", %err, "driver channel failed");
                return Err(err).context("driver channel recv_buffer failed");
            }
        };

        let frame = match parse_frame(buf) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target: "parser", %err, "dropping malformed frame");
                continue;
            }
        };

        match frame {
            Frame::Singletouch(data) => {
                let mut contacts = [TouchContactReport::default(); MAX_CONTACTS];
                contacts[0] = TouchContactReport {
                    touch: data.touch,
                    contact_id: 0,
                    x: data.x.min(MAX_SINGLETOUCH),
                    y: data.y.min(MAX_SINGLETOUCH),
                };
                let report = TouchReport {
                    contact_num: data.touch as u8,
                    contacts,
                };
                send_report(channel, IptsHidReport::Touch(report))?;
            }
            Frame::Heatmap(heatmap) => {
                if config.stylus_disable_touch && stylus_active {
                    debug!(target: "runtime", "suppressing touch report while stylus active");
                    continue;
                }
                let points = pipeline.touch_processor.process(&heatmap);
                let inputs = pipeline.touch_manager.process(
                    &points,
                    heatmap.width() as f32,
                    heatmap.height() as f32,
                );
                let report = build_touch_report(inputs, config.touch_disable_on_palm);
                send_report(channel, IptsHidReport::Touch(report))?;
                std::thread::sleep(TOUCH_REPORT_THROTTLE);
            }
            Frame::Stylus(data) => {
                stylus_active = data.proximity;
                if data.proximity {
                    update_cone_position(
                        pipeline,
                        data.x as f64 / MAX_X as f64,
                        data.y as f64 / MAX_Y as f64,
                    );
                }
                let report = legacy_stylus_report(&data);
                send_report(channel, IptsHidReport::Stylus(report))?;
            }
            Frame::StylusDft(data) => {
                if let Some(input) = pipeline.stylus_decoder.process(&data) {
                    stylus_active = input.proximity;
                    if input.proximity {
                        update_cone_position(pipeline, input.x as f64, input.y as f64);
                    }
                    let report = build_stylus_report(&input);
                    send_report(channel, IptsHidReport::Stylus(report))?;
                }
            }
        }
    }
}

fn send_report(channel: &mut dyn DriverChannel, report: IptsHidReport) -> Result<(), TransportError> {
    channel.send_hid_report(&report)
}

/// Anchors every palm-rejection cone at the stylus's last in-range position.
/// With one stylus device there is exactly one cone; a multi-device setup
/// would key this by device serial instead.
fn update_cone_position(pipeline: &mut Pipeline, x: f64, y: f64) {
    for cone in pipeline.touch_manager.cones_mut() {
        cone.update_position(x, y);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();

    info!(target: "runtime", "startup");

    let device = DeviceInfo {
        vendor_id: args.vendor,
        product_id: args.product,
    };
    let config = Config::load(device, &args.config_dir).context("loading device configuration")?;
    info!(target: "runtime", width = config.width, height = config.height, advanced = config.touch_advanced, "configuration loaded");

    let signals = SignalFlags::install().context("installing signal handlers")?;
    let mut pipeline = Pipeline::new(&config);

    if let Some(replay_path) = &args.replay {
        let mut stub = ChannelStub::new(load_replay_buffers(replay_path)?);
        run_loop(&mut stub, &signals, &config, &mut pipeline)
    } else {
        let mut channel = MmapChannel::open(&args.data, &args.doorbell, &args.hid, args.buffer_size)
            .context("opening driver channel")?;
        run_loop(&mut channel, &signals, &config, &mut pipeline)
    }
}

/// Each non-empty line is one buffer, hex-encoded. Used only with `--replay`
/// for local smoke-testing without the real driver.
fn load_replay_buffers(path: &Path) -> Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading replay file {}", path.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| decode_hex(line.trim()).with_context(|| format!("decoding replay line: {line}")))
        .collect()
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        anyhow::bail!("odd-length hex string");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(anyhow::Error::from))
        .collect()
}
