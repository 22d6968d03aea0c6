use std::{path::PathBuf, sync::Arc};
use anyhow::Context;
use clap::Parser;
use canpanel::{logger::LogSink, runtime, settings::{self, Settings}, ControlPanel};
use canpanel_socketcan::{IpLink, SocketCanFactory};

/// Send actuator commands on a SocketCAN interface.
///
/// Commands are read from stdin, one per line:
///   forward|f backward|b left|l right|r stop|s
///   connect open close loop on|off interval <value> bitrate <N> status quit
#[derive(Debug, Parser)]
#[command(name = "canpanel", version, about, author)]
struct Args {
    /// CAN interface name, overrides the settings file
    #[arg(short = 'i', long = "iface")]
    iface: Option<String>,

    /// Settings file
    #[arg(short = 's', long = "settings")]
    settings: Option<PathBuf>,

    /// Repeat forward/backward until stop
    #[arg(short = 'l', long = "loop")]
    looping: bool,

    /// Loop interval: `250`, `250ms` or `1.5s`
    #[arg(short = 't', long = "interval", default_value = "1000ms")]
    interval: String,

    /// Append the frame log to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let path = args.settings.unwrap_or_else(settings::default_path);
    let (mut settings, persist) = match Settings::load_or_backup(&path) {
        Ok(v) => (v, true),
        Err(e) => {
            log::warn!("{}, using defaults and not saving settings", e);
            (Settings::default(), false)
        },
    };
    if let Some(iface) = args.iface {
        settings.set_interface_name(iface);
    }

    let sink = match &args.log_file {
        Some(file) => LogSink::with_file(file)
            .with_context(|| format!("unable to open log file `{}`", file.display()))?,
        None => LogSink::new(),
    };

    let mut panel = ControlPanel::new(settings, SocketCanFactory, Arc::new(IpLink::new()));
    if persist {
        panel = panel.with_settings_path(path.clone());
    }
    panel.session().register_listener("log".into(), Box::new(sink));
    panel.set_loop_enabled(args.looping);
    panel.set_interval(&args.interval);

    log::info!(
        "interface {} is {}",
        panel.settings().interface_name(),
        if panel.link_is_up() { "UP" } else { "DOWN" },
    );

    let mut stdout = std::io::stdout();
    runtime::run(&mut panel, std::io::stdin(), &mut stdout)?;

    panel.close();
    if persist {
        panel.settings().save(&path)?;
    }
    Ok(())
}
