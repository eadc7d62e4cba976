use common::error::Res;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Envelope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSubscription {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelSubscription {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
}

/// Every command the subscription worker accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(StartSubscription),
    Cancel(CancelSubscription),
}

impl Command {
    pub const START: &'static str = "StartSubscription";
    pub const CANCEL: &'static str = "CancelSubscription";

    /// Envelope discriminator of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Start(_) => Self::START,
            Command::Cancel(_) => Self::CANCEL,
        }
    }

    pub fn to_envelope(&self) -> Res<Envelope> {
        let data = match self {
            Command::Start(start) => serde_json::to_value(start)?,
            Command::Cancel(cancel) => serde_json::to_value(cancel)?,
        };
        Ok(Envelope {
            kind: self.kind().to_string(),
            data,
        })
    }

    /// Decodes the payload of a known discriminator. `Ok(None)` for unknown
    /// ones, an error when the payload does not fit its declared command.
    pub fn from_envelope(envelope: &Envelope) -> Res<Option<Command>> {
        let command = match envelope.kind.as_str() {
            Self::START => Command::Start(serde_json::from_value(envelope.data.clone())?),
            Self::CANCEL => Command::Cancel(serde_json::from_value(envelope.data.clone())?),
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}
