use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Largest timestamp both storage backends can hold in a signed BIGINT.
pub const MAX_TIMESTAMP: u64 = i64::MAX as u64;

const MAX_KIND_LEN: usize = 32;

/// One captured event in its stored short-key form: `{ t, ts, d }`.
///
/// The payload stays as raw JSON so that stored rows are served back
/// exactly as recorded, including types this build does not know about.
/// Use [`ReplayAction::payload`] to get the typed view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayAction {
    #[serde(rename = "t")]
    pub kind: String,
    #[serde(rename = "ts")]
    pub timestamp: u64,
    #[serde(rename = "d", default)]
    pub data: Value,
}

impl ReplayAction {
    pub fn new(timestamp: u64, payload: &ActionPayload) -> Result<Self> {
        let action = Self {
            kind: payload.kind().to_string(),
            timestamp,
            data: payload.to_data()?,
        };
        action.validate()?;
        Ok(action)
    }

    pub fn payload(&self) -> Result<ActionPayload> {
        ActionPayload::decode(&self.kind, &self.data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind.is_empty() || self.kind.len() > MAX_KIND_LEN {
            return Err(Error::Validation(format!(
                "action type must be 1..={MAX_KIND_LEN} bytes"
            )));
        }
        if self.timestamp > MAX_TIMESTAMP {
            return Err(Error::Validation(format!(
                "action timestamp {} exceeds {MAX_TIMESTAMP}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Route,
    #[serde(rename = "cmd")]
    Command,
    Click,
    Submit,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Route => write!(f, "route"),
            ActionKind::Command => write!(f, "cmd"),
            ActionKind::Click => write!(f, "click"),
            ActionKind::Submit => write!(f, "submit"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "route" => Ok(ActionKind::Route),
            "cmd" => Ok(ActionKind::Command),
            "click" => Ok(ActionKind::Click),
            "submit" => Ok(ActionKind::Submit),
            _ => Err(crate::error::Error::Validation(format!(
                "unknown action type: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAction {
    pub path: String,
}

/// An application command, e.g. `like-post` with `{"postId": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAction {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "a", default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickAction {
    #[serde(rename = "s")]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAction {
    #[serde(rename = "f")]
    pub form: String,
    #[serde(rename = "v", default, skip_serializing_if = "Map::is_empty")]
    pub values: Map<String, Value>,
}

/// Typed payload, one shape per [`ActionKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Route(RouteAction),
    Command(CommandAction),
    Click(ClickAction),
    Submit(SubmitAction),
}

impl ActionPayload {
    pub fn route(path: impl Into<String>) -> Self {
        ActionPayload::Route(RouteAction { path: path.into() })
    }

    pub fn command(name: impl Into<String>, args: Value) -> Self {
        ActionPayload::Command(CommandAction {
            name: name.into(),
            args,
        })
    }

    pub fn click(target: impl Into<String>) -> Self {
        ActionPayload::Click(ClickAction {
            target: target.into(),
        })
    }

    pub fn submit(form: impl Into<String>, values: Map<String, Value>) -> Self {
        ActionPayload::Submit(SubmitAction {
            form: form.into(),
            values,
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::Route(_) => ActionKind::Route,
            ActionPayload::Command(_) => ActionKind::Command,
            ActionPayload::Click(_) => ActionKind::Click,
            ActionPayload::Submit(_) => ActionKind::Submit,
        }
    }

    pub fn to_data(&self) -> Result<Value> {
        let value = match self {
            ActionPayload::Route(a) => serde_json::to_value(a)?,
            ActionPayload::Command(a) => serde_json::to_value(a)?,
            ActionPayload::Click(a) => serde_json::to_value(a)?,
            ActionPayload::Submit(a) => serde_json::to_value(a)?,
        };
        Ok(value)
    }

    pub fn decode(kind: &str, data: &Value) -> Result<Self> {
        let malformed =
            |e: serde_json::Error| Error::Validation(format!("malformed {kind} payload: {e}"));
        let payload = match kind.parse::<ActionKind>()? {
            ActionKind::Route => {
                ActionPayload::Route(RouteAction::deserialize(data).map_err(malformed)?)
            }
            ActionKind::Command => {
                ActionPayload::Command(CommandAction::deserialize(data).map_err(malformed)?)
            }
            ActionKind::Click => {
                ActionPayload::Click(ClickAction::deserialize(data).map_err(malformed)?)
            }
            ActionKind::Submit => {
                ActionPayload::Submit(SubmitAction::deserialize(data).map_err(malformed)?)
            }
        };
        Ok(payload)
    }
}
