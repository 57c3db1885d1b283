use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::Parser;
use std::sync::{Arc, Mutex};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gammashift::backends::{self, METHODS, MethodOptions};
use gammashift::cli::{ModeArg, Opts};
use gammashift::color::{
    ColorSetting, DEFAULT_BRIGHTNESS, DEFAULT_GAMMA, NEUTRAL_TEMP, validate_temperature,
};
use gammashift::config::{Configuration, PeriodSetting, Settings};
use gammashift::geoclue;
use gammashift::ipc::{self, Control, SharedAppState, handle_stdin_commands};
use gammashift::print;
use gammashift::scheduling::{DayPhase, compute_day_stops, next_wakeup, phase_for, setting_for};
use gammashift::session::{Adjuster, CrtcTarget};

/// Fixed modes have nothing to wait for; re-apply this often anyway.
const FIXED_MODE_INTERVAL: i64 = 3600;

/// Applied while adjustment is disabled. Gamma is left as it is.
const NEUTRAL: PeriodSetting = PeriodSetting {
    temperature: NEUTRAL_TEMP,
    brightness: DEFAULT_BRIGHTNESS,
    gamma: None,
};

const RESET: PeriodSetting = PeriodSetting {
    gamma: Some([DEFAULT_GAMMA; 3]),
    ..NEUTRAL
};

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "gammashift=warn",
        1 => "gammashift=info",
        _ => "gammashift=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Setting for `now` under `mode`, the phase it belongs to and when it
/// next changes.
fn current_period(
    settings: &Settings,
    mode: ModeArg,
    night: PeriodSetting,
    day: PeriodSetting,
    now: i64,
) -> Result<(PeriodSetting, DayPhase, i64)> {
    match mode {
        ModeArg::Day => Ok((day, DayPhase::Day, now + FIXED_MODE_INTERVAL)),
        ModeArg::Night => Ok((night, DayPhase::Night, now + FIXED_MODE_INTERVAL)),
        ModeArg::Auto => {
            let sun = settings.sun.ok_or_else(|| {
                anyhow!("No location given. Use --lat/--lon, --sunrise/--sunset or --mode day|night")
            })?;
            let stops = compute_day_stops(now, sun, settings.transition)?;
            Ok((
                setting_for(now, stops, night, day),
                phase_for(now, stops),
                next_wakeup(now, stops),
            ))
        }
    }
}

/// The setting a one-shot invocation applies.
fn one_shot_setting(opts: &Opts, settings: &Settings) -> Result<PeriodSetting> {
    if opts.reset {
        return Ok(RESET);
    }
    if let Some(temperature) = opts.set {
        validate_temperature(temperature)?;
        return Ok(PeriodSetting {
            temperature,
            ..settings.day
        });
    }
    let now = Local::now().timestamp();
    let (period, _, _) = current_period(settings, opts.mode, settings.night, settings.day, now)?;
    Ok(period)
}

/// Whether the sun position decides the setting at some point.
fn follows_sun(opts: &Opts) -> bool {
    opts.mode == ModeArg::Auto && !opts.reset && opts.set.is_none()
}

/// Falls back to GeoClue when the sun is followed but neither a location
/// nor manual times were given.
async fn ensure_location(opts: &Opts, settings: &mut Settings) -> Result<()> {
    if settings.sun.is_some() || !follows_sun(opts) {
        return Ok(());
    }
    info!("Resolving location via GeoClue");
    let sun = tokio::task::spawn_blocking(|| {
        geoclue::locate(geoclue::DESKTOP_ID, geoclue::DEFAULT_TIMEOUT)
    })
    .await
    .context("GeoClue lookup task")?
    .context("GeoClue failed. Use --lat/--lon, --sunrise/--sunset or --mode day|night")?;
    settings.sun = Some(sun);
    Ok(())
}

/// Period gamma, when configured, replaces per-output gamma everywhere.
fn apply(adjuster: &mut dyn Adjuster, period: PeriodSetting) -> Result<()> {
    adjuster.set_temperature(CrtcTarget::ALL, period.temperature);
    adjuster.set_brightness(CrtcTarget::ALL, period.brightness);
    if let Some(gamma) = period.gamma {
        adjuster.set_gamma(CrtcTarget::ALL, gamma);
    }
    adjuster.update()?;
    Ok(())
}

fn print_methods() {
    println!("Available adjustment methods:");
    for method in METHODS {
        println!("  {:<10} {}", method.name, method.help);
    }
    println!();
    println!("Without --method, every method but dummy is tried in this order.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    init_tracing(opts.verbose);

    if opts.method.as_deref() == Some("list") {
        print_methods();
        return Ok(());
    }

    let config = Configuration::load(opts.config.as_deref())?;
    let mut settings = Settings::resolve(&opts, config)?;
    ensure_location(&opts, &mut settings).await?;

    if let Some(format) = opts.print {
        let period = one_shot_setting(&opts, &settings)?;
        let gamma = period
            .gamma
            .unwrap_or(settings.selections.default_selection().settings.gamma);
        let setting = ColorSetting::new(period.temperature, period.brightness, gamma)?;
        let ramps = print::compute(opts.ramp_size, &setting)?;
        return print::write_ramps(&mut std::io::stdout().lock(), &ramps, format);
    }

    let one_shot = opts.oneshot || opts.reset || opts.set.is_some();
    // Fail on a missing location before any display is touched.
    let initial = if one_shot {
        Some(one_shot_setting(&opts, &settings)?)
    } else {
        current_period(&settings, opts.mode, settings.night, settings.day, Local::now().timestamp())?;
        None
    };

    let options = MethodOptions {
        dummy_ramp_size: Some(opts.ramp_size),
    };
    let mut adjuster = backends::start_method(
        settings.method.as_deref(),
        &options,
        settings.selections.clone(),
    )?;
    info!(crtcs = adjuster.crtc_count(), "Adjusting CRTCs");

    if let Some(period) = initial {
        info!(
            temperature = period.temperature,
            brightness = period.brightness,
            "Applying one-shot setting"
        );
        apply(adjuster.as_mut(), period)?;
        // Leave the ramps in place; only handles are released.
        adjuster.teardown();
        return Ok(());
    }

    let result = run(&opts, &settings, adjuster.as_mut()).await;
    adjuster.restore();
    adjuster.teardown();
    result
}

async fn run(opts: &Opts, settings: &Settings, adjuster: &mut dyn Adjuster) -> Result<()> {
    let mut night = settings.night;
    let mut day = settings.day;
    let mut mode = opts.mode;
    let mut disabled = false;

    let shared = Arc::new(Mutex::new(SharedAppState::new(
        adjuster.method_name(),
        night.temperature,
        day.temperature,
    )));
    let (tx, mut rx) = unbounded_channel::<Control>();
    if opts.stdin_control {
        let shared = Arc::clone(&shared);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_stdin_commands(shared, tx).await {
                warn!("Control channel error: {e:#}");
            }
        });
    }

    let mut sigint = signal(SignalKind::interrupt()).context("setup SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("setup SIGTERM handler")?;
    let mut sigusr1 = signal(SignalKind::user_defined1()).context("setup SIGUSR1 handler")?;

    loop {
        let now = Local::now().timestamp();
        let (period, phase, wake) = current_period(settings, mode, night, day, now)?;
        let applied = if disabled { NEUTRAL } else { period };
        apply(adjuster, applied)?;

        {
            let mut state = ipc::lock(&shared);
            state.requested_mode = mode;
            state.current_mode = phase;
            state.disabled = disabled;
            state.current_temp = applied.temperature;
            state.current_brightness = applied.brightness;
            state.low_temp = night.temperature;
            state.high_temp = day.temperature;
            state.outputs = adjuster.summaries();
        }

        let wait = u64::try_from((wake - now).max(1)).unwrap_or(1);
        tokio::select! {
            _ = sigint.recv() => {
                info!("Interrupted, restoring gamma ramps");
                break;
            }
            _ = sigterm.recv() => {
                info!("Terminated, restoring gamma ramps");
                break;
            }
            _ = sigusr1.recv() => {
                disabled = !disabled;
                info!(disabled, "Toggled adjustment");
            }
            Some(control) = rx.recv() => match control {
                Control::SetMode(new_mode) => mode = new_mode,
                Control::SetTemperature { low, high } => {
                    night.temperature = low;
                    day.temperature = high;
                }
                Control::SetGamma(gamma) => {
                    night.gamma = Some(gamma);
                    day.gamma = Some(gamma);
                }
                Control::Toggle => disabled = !disabled,
            },
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(wait)) => {}
        }
    }
    Ok(())
}
