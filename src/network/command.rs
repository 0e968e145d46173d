use serde::{Deserialize, Serialize};

use crate::common::Mode;
use crate::session::SessionSnapshot;

/// One JSON line sent by a control client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    Status,
    SetMode {
        #[serde(default)]
        mode: Mode,
    },
    /// Turns the connection into a stream of label events
    Subscribe,
    /// Turns the connection into a stream of session events
    Events,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            session: None,
            mode: None,
            status: None,
            stream: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn with_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_status(mut self, status: SessionSnapshot) -> Self {
        self.status = Some(status);
        self
    }

    pub fn streaming(mut self, stream: &'static str) -> Self {
        self.stream = Some(stream);
        self
    }
}
