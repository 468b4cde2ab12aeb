use std::fmt::{Display, Formatter};

use anyhow::Result;

use pg::prelude::{Action, ModelActionType, PgError, RawActionCode};

/// ALE action codes of the Pong paddle
pub const ALE_NOOP: RawActionCode = 0;
pub const ALE_UP: RawActionCode = 2;
pub const ALE_DOWN: RawActionCode = 3;

/// The two paddle moves the policy chooses from
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PongAction {
    Down,
    Up,
}

impl Action for PongAction {
    const ACTION_SPACE: ModelActionType = 2;

    fn numeric(&self) -> ModelActionType {
        match self {
            PongAction::Down => 0,
            PongAction::Up => 1,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(PongAction::Down),
            1 => Ok(PongAction::Up),
            _ => Err(PgError::ActionMapping(format!("value {} out of range", value)).into()),
        }
    }

    fn raw_code(&self) -> RawActionCode {
        match self {
            PongAction::Down => ALE_DOWN,
            PongAction::Up => ALE_UP,
        }
    }

    fn try_from_raw_code(code: RawActionCode) -> Result<Self> {
        match code {
            ALE_DOWN => Ok(PongAction::Down),
            ALE_UP => Ok(PongAction::Up),
            _ => Err(PgError::ActionMapping(format!("{} is not a paddle move", code)).into()),
        }
    }

    fn noop_code() -> RawActionCode { ALE_NOOP }
}

impl Display for PongAction {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
