//! Terminal host for the camera controller and the chat session.
//!
//! Stands in for the render surface: it owns the camera transform, grants
//! pointer-lock requests immediately, and prints what a window would draw.

use std::num::ParseFloatError;
use std::str::FromStr;
use std::sync::Arc;

use drift_camera::{
    CameraTransform, ControlRequest, FirstPersonController, KeyCode, MoveAction, UnknownKeyCode,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::sync::mpsc;

use crate::chat::{ChatSession, SessionChange, SessionEvent, SubmitOutcome};
use crate::settings::{SettingsError, SettingsStore};

pub const HELP_TEXT: &str = "\
Floating universe
  /click               lock the pointer
  /look <dx> <dy>      mouse look (pointer must be locked)
  /key <Code> down|up  W A S D or arrow keys move, Space rises, ShiftLeft sinks,
                       KeyF spawns a marker, Escape unlocks the pointer
  /camera              show the camera
  /markers             list spawned markers
  /api-key <key>       store the OpenAI API key
  /help                show this text
  /quit                exit
Anything else is sent to the assistant. Drift freely through the endless universe!";

const REPLY_PREFIX: &str = "assistant> ";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat(String),
    Click,
    LockFailed(String),
    Key { code: KeyCode, pressed: bool },
    Look { delta_x: f32, delta_y: f32 },
    Camera,
    Markers,
    ApiKey(String),
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("unknown command '/{name}', try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("/{command} needs <{arg}>"))]
    MissingArgument {
        stage: &'static str,
        command: &'static str,
        arg: &'static str,
    },
    #[snafu(display("{source}"))]
    InvalidKey {
        stage: &'static str,
        source: UnknownKeyCode,
    },
    #[snafu(display("expected 'down' or 'up', got '{raw}'"))]
    InvalidKeyState { stage: &'static str, raw: String },
    #[snafu(display("'{raw}' is not a number: {source}"))]
    InvalidNumber {
        stage: &'static str,
        raw: String,
        source: ParseFloatError,
    },
    #[snafu(display("failed to save API key: {source}"))]
    SaveApiKey {
        stage: &'static str,
        source: SettingsError,
    },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let Some(rest) = line.trim().strip_prefix('/') else {
            return Ok(Self::Chat(line.to_string()));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let command = match name {
            "click" => Self::Click,
            "lock-failed" | "lock-error" => {
                let reason = words.collect::<Vec<_>>().join(" ");
                Self::LockFailed(if reason.is_empty() {
                    "pointer lock denied".to_string()
                } else {
                    reason
                })
            }
            "key" => {
                let raw_code = words.next().context(MissingArgumentSnafu {
                    stage: "parse-key-code",
                    command: "key",
                    arg: "Code",
                })?;
                let code = raw_code.parse().context(InvalidKeySnafu {
                    stage: "parse-key-code",
                })?;
                let pressed = match words.next().unwrap_or("down") {
                    "down" | "press" => true,
                    "up" | "release" => false,
                    other => {
                        return InvalidKeyStateSnafu {
                            stage: "parse-key-state",
                            raw: other,
                        }
                        .fail();
                    }
                };
                Self::Key { code, pressed }
            }
            "look" => Self::Look {
                delta_x: parse_number(words.next(), "look", "dx")?,
                delta_y: parse_number(words.next(), "look", "dy")?,
            },
            "camera" => Self::Camera,
            "markers" => Self::Markers,
            "api-key" => {
                let key = words.next().context(MissingArgumentSnafu {
                    stage: "parse-api-key",
                    command: "api-key",
                    arg: "key",
                })?;
                Self::ApiKey(key.to_string())
            }
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => {
                return UnknownCommandSnafu {
                    stage: "parse-command",
                    name: other,
                }
                .fail();
            }
        };
        Ok(command)
    }
}

fn parse_number(
    raw: Option<&str>,
    command: &'static str,
    arg: &'static str,
) -> Result<f32, CommandError> {
    let raw = raw.context(MissingArgumentSnafu {
        stage: "parse-number",
        command,
        arg,
    })?;
    raw.parse().context(InvalidNumberSnafu {
        stage: "parse-number",
        raw,
    })
}

/// Text for the terminal. `Inline` continues the current line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Line(String),
    Inline(String),
}

impl Output {
    fn line(text: impl Into<String>) -> Self {
        Self::Line(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(Vec<Output>),
    Quit,
}

pub struct DriftApp {
    settings: Arc<SettingsStore>,
    camera: CameraTransform,
    controller: FirstPersonController,
    chat: ChatSession,
}

impl DriftApp {
    pub fn new(settings: Arc<SettingsStore>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (chat, events) = ChatSession::new(settings.clone());
        (Self::with_chat(settings, chat), events)
    }

    pub fn with_chat(settings: Arc<SettingsStore>, chat: ChatSession) -> Self {
        let camera = CameraTransform::default();
        let controller = FirstPersonController::new(settings.settings().controls, &camera);
        Self {
            settings,
            camera,
            controller,
            chat,
        }
    }

    pub fn camera(&self) -> &CameraTransform {
        &self.camera
    }

    pub fn controller(&self) -> &FirstPersonController {
        &self.controller
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn handle_line(&mut self, line: &str) -> Flow {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(error) => {
                tracing::debug!(error = %error, "rejected command");
                Flow::Continue(vec![Output::line(error.to_string())])
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        let output = match command {
            Command::Quit => return Flow::Quit,
            Command::Help => vec![Output::line(HELP_TEXT)],
            Command::Chat(text) => self.submit(&text),
            Command::Click => match self.controller.request_pointer_lock() {
                Some(request) => self.apply_request(request),
                None => vec![Output::line("pointer already locked")],
            },
            Command::LockFailed(reason) => {
                self.controller.on_pointer_lock_error(&reason);
                vec![Output::line(format!("pointer lock failed: {reason}"))]
            }
            Command::Key { code, pressed } => {
                match self.controller.on_key_event(code, pressed, &self.camera) {
                    Some(request) => self.apply_request(request),
                    None => Vec::new(),
                }
            }
            Command::Look { delta_x, delta_y } => {
                if !self.controller.is_locked() {
                    vec![Output::line("pointer is not locked, use /click first")]
                } else {
                    self.controller
                        .on_mouse_move(delta_x, delta_y, &mut self.camera);
                    vec![self.describe_camera()]
                }
            }
            Command::Camera => vec![self.describe_camera()],
            Command::Markers => self.describe_markers(),
            Command::ApiKey(key) => match self.set_api_key(&key) {
                Ok(()) => vec![Output::line(format!(
                    "API key saved to {}",
                    self.settings.config_path().display()
                ))],
                Err(error) => {
                    tracing::error!(error = %error, "failed to store API key");
                    vec![Output::line(error.to_string())]
                }
            },
        };
        Flow::Continue(output)
    }

    /// Advances movement by one frame.
    pub fn tick(&mut self, delta_seconds: f32) {
        self.controller.on_frame(delta_seconds, &mut self.camera);
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) -> Vec<Output> {
        match self.chat.handle_event(event) {
            Some(SessionChange::FragmentAppended { fragment, .. }) => {
                vec![Output::Inline(fragment)]
            }
            Some(SessionChange::Completed { .. }) => vec![Output::line("")],
            Some(SessionChange::Failed { notice_id, .. }) => {
                let notice = self
                    .chat
                    .message(notice_id)
                    .map(|message| message.text.clone())
                    .unwrap_or_default();
                vec![
                    Output::line(""),
                    Output::line(format!("{REPLY_PREFIX}{notice}")),
                ]
            }
            None => Vec::new(),
        }
    }

    fn submit(&mut self, text: &str) -> Vec<Output> {
        match self.chat.submit(text) {
            SubmitOutcome::Ignored => Vec::new(),
            SubmitOutcome::Started(_) => vec![Output::Inline(REPLY_PREFIX.to_string())],
            SubmitOutcome::NotConfigured | SubmitOutcome::Failed => self
                .chat
                .messages()
                .last()
                .map(|notice| vec![Output::line(format!("{REPLY_PREFIX}{}", notice.text))])
                .unwrap_or_default(),
        }
    }

    fn set_api_key(&mut self, key: &str) -> Result<(), CommandError> {
        self.chat.set_api_key(key).context(SaveApiKeySnafu {
            stage: "store-api-key",
        })
    }

    // The terminal surface grants and releases pointer lock synchronously.
    fn apply_request(&mut self, request: ControlRequest) -> Vec<Output> {
        match request {
            ControlRequest::AcquirePointerLock => {
                let cursor = self.controller.on_pointer_lock_acquired();
                vec![Output::line(format!("pointer locked, cursor {cursor:?}"))]
            }
            ControlRequest::ReleasePointerLock => {
                let cursor = self.controller.on_pointer_lock_released();
                vec![Output::line(format!("pointer released, cursor {cursor:?}"))]
            }
            ControlRequest::MarkerSpawned(marker) => vec![Output::line(format!(
                "marker #{} at ({:.2}, {:.2}, {:.2})",
                marker.id, marker.position.x, marker.position.y, marker.position.z
            ))],
        }
    }

    fn describe_camera(&self) -> Output {
        let position = self.camera.position;
        let look = self.controller.look();
        let intent = self.controller.intent();
        let held = [
            (MoveAction::Forward, "forward"),
            (MoveAction::Backward, "backward"),
            (MoveAction::Left, "left"),
            (MoveAction::Right, "right"),
            (MoveAction::Up, "up"),
            (MoveAction::Down, "down"),
        ]
        .into_iter()
        .filter(|(action, _)| intent.is_held(*action))
        .map(|(_, name)| name)
        .collect::<Vec<_>>();

        Output::line(format!(
            "position ({:.2}, {:.2}, {:.2}) yaw {:.3} pitch {:.3} locked {} moving [{}]",
            position.x,
            position.y,
            position.z,
            look.yaw,
            look.pitch,
            self.controller.is_locked(),
            held.join(" "),
        ))
    }

    fn describe_markers(&self) -> Vec<Output> {
        let markers = self.controller.markers();
        if markers.is_empty() {
            return vec![Output::line("no markers yet, press KeyF")];
        }
        markers
            .iter()
            .map(|marker| {
                Output::line(format!(
                    "#{} ({:.2}, {:.2}, {:.2})",
                    marker.id, marker.position.x, marker.position.y, marker.position.z
                ))
            })
            .collect()
    }
}
