use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::cli::ModeArg;
use crate::config::GammaValue;
use crate::scheduling::DayPhase;
use crate::session::CrtcSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    SetMode { mode: String },
    GetStatus,
    SetTemperature { low: u32, high: u32 },
    SetGamma { gamma: GammaValue },
    Toggle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputStatus {
    pub site: usize,
    pub site_identifier: Option<String>,
    pub partition: usize,
    pub crtc: usize,
    pub ramp_size: usize,
    pub active: bool,
    pub temperature: u32,
    pub brightness: f32,
    pub gamma: [f32; 3],
}

impl From<&CrtcSummary> for OutputStatus {
    fn from(summary: &CrtcSummary) -> Self {
        Self {
            site: summary.site,
            site_identifier: summary.site_identifier.clone(),
            partition: summary.partition,
            crtc: summary.crtc,
            ramp_size: summary.ramp_size,
            active: summary.active,
            temperature: summary.settings.temperature,
            brightness: summary.settings.brightness,
            gamma: summary.settings.gamma,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    Status {
        method: String,
        requested_mode: String,
        current_mode: String,
        disabled: bool,
        current_temp: u32,
        current_brightness: f32,
        low_temp: u32,
        high_temp: u32,
        outputs: Vec<OutputStatus>,
    },
    Error {
        message: String,
    },
}

/// What the control channel asks the driving loop to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    SetMode(ModeArg),
    SetTemperature { low: u32, high: u32 },
    SetGamma([f32; 3]),
    Toggle,
}

/// Published by the driving loop after every update.
#[derive(Debug, Clone)]
pub struct SharedAppState {
    pub method: &'static str,
    pub requested_mode: ModeArg,
    pub current_mode: DayPhase,
    pub disabled: bool,
    pub current_temp: u32,
    pub current_brightness: f32,
    pub low_temp: u32,
    pub high_temp: u32,
    pub outputs: Vec<CrtcSummary>,
}

impl SharedAppState {
    pub fn new(method: &'static str, low_temp: u32, high_temp: u32) -> Self {
        Self {
            method,
            requested_mode: ModeArg::Auto,
            current_mode: DayPhase::Day,
            disabled: false,
            current_temp: high_temp,
            current_brightness: 1.0,
            low_temp,
            high_temp,
            outputs: Vec::new(),
        }
    }
}

pub type SharedState = Arc<Mutex<SharedAppState>>;

pub fn lock(state: &SharedState) -> MutexGuard<'_, SharedAppState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn format_status_response(state: &SharedAppState) -> IpcResponse {
    let mode = match state.requested_mode {
        ModeArg::Auto => "auto",
        ModeArg::Day => "day",
        ModeArg::Night => "night",
    };
    let current = match state.current_mode {
        DayPhase::Night => "night",
        DayPhase::Sunrise => "sunrise",
        DayPhase::Day => "day",
        DayPhase::Sunset => "sunset",
    };
    IpcResponse::Status {
        method: state.method.to_string(),
        requested_mode: mode.to_string(),
        current_mode: current.to_string(),
        disabled: state.disabled,
        current_temp: state.current_temp,
        current_brightness: state.current_brightness,
        low_temp: state.low_temp,
        high_temp: state.high_temp,
        outputs: state.outputs.iter().map(OutputStatus::from).collect(),
    }
}

fn error(message: impl Into<String>) -> IpcResponse {
    IpcResponse::Error {
        message: message.into(),
    }
}

/// Decodes one command line, queues its effect and answers it.
pub fn handle_line(line: &str, shared: &SharedState, tx: &UnboundedSender<Control>) -> IpcResponse {
    let command = match serde_json::from_str::<IpcCommand>(line.trim()) {
        Ok(command) => command,
        Err(e) => return error(format!("Invalid command: {e}")),
    };

    let control = match command {
        IpcCommand::GetStatus => return format_status_response(&lock(shared)),
        IpcCommand::SetMode { mode } => match mode.as_str() {
            "auto" => Control::SetMode(ModeArg::Auto),
            "day" => Control::SetMode(ModeArg::Day),
            "night" => Control::SetMode(ModeArg::Night),
            other => return error(format!("Unknown mode `{other}'")),
        },
        IpcCommand::SetTemperature { low, high } => {
            if let Err(e) = crate::color::validate_temperature(low)
                .and_then(|()| crate::color::validate_temperature(high))
            {
                return error(e.to_string());
            }
            Control::SetTemperature { low, high }
        }
        IpcCommand::SetGamma { gamma } => {
            match gamma.to_gamma().map_err(|e| e.to_string()).and_then(|g| {
                crate::color::validate_gamma(g)
                    .map(|()| g)
                    .map_err(|e| e.to_string())
            }) {
                Ok(g) => Control::SetGamma(g),
                Err(message) => return error(message),
            }
        }
        IpcCommand::Toggle => Control::Toggle,
    };

    info!(?control, "Control command");
    {
        // Reflect the request right away; the loop fills in the rest.
        let mut state = lock(shared);
        match &control {
            Control::SetMode(mode) => state.requested_mode = *mode,
            Control::SetTemperature { low, high } => {
                state.low_temp = *low;
                state.high_temp = *high;
            }
            Control::Toggle => state.disabled = !state.disabled,
            Control::SetGamma(_) => {}
        }
    }
    if tx.send(control).is_err() {
        return error("Adjustment loop has stopped");
    }
    format_status_response(&lock(shared))
}

pub async fn handle_stdin_commands(shared: SharedState, tx: UnboundedSender<Control>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_line(&line, &shared, &tx);
                let response_json = serde_json::to_string(&response)?;
                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(e) => {
                warn!("Error reading from stdin: {e}");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn shared() -> SharedState {
        Arc::new(Mutex::new(SharedAppState::new("dummy", 4000, 6500)))
    }

    #[test]
    fn decodes_commands() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"set_gamma","gamma":"1:0.9:0.8"}"#).unwrap();
        assert_eq!(
            cmd,
            IpcCommand::SetGamma {
                gamma: GammaValue::Text("1:0.9:0.8".into())
            }
        );
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"toggle"}"#).unwrap();
        assert_eq!(cmd, IpcCommand::Toggle);
    }

    #[test]
    fn queues_mode_change() {
        let state = shared();
        let (tx, mut rx) = unbounded_channel();
        let response = handle_line(r#"{"type":"set_mode","mode":"night"}"#, &state, &tx);
        assert!(matches!(
            response,
            IpcResponse::Status { ref requested_mode, .. } if requested_mode == "night"
        ));
        assert_eq!(rx.try_recv().unwrap(), Control::SetMode(ModeArg::Night));
    }

    #[test]
    fn rejects_bad_input_without_queueing() {
        let state = shared();
        let (tx, mut rx) = unbounded_channel();
        assert!(matches!(handle_line("nope", &state, &tx), IpcResponse::Error { .. }));
        assert!(matches!(
            handle_line(r#"{"type":"set_temperature","low":500,"high":6500}"#, &state, &tx),
            IpcResponse::Error { .. }
        ));
        assert!(matches!(
            handle_line(r#"{"type":"set_gamma","gamma":20.0}"#, &state, &tx),
            IpcResponse::Error { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn status_reports_method_and_toggle() {
        let state = shared();
        let (tx, _rx) = unbounded_channel();
        handle_line(r#"{"type":"toggle"}"#, &state, &tx);
        match handle_line(r#"{"type":"get_status"}"#, &state, &tx) {
            IpcResponse::Status {
                method, disabled, ..
            } => {
                assert_eq!(method, "dummy");
                assert!(disabled);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
}
