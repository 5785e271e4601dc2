use serde::{Deserialize, Serialize};
use tidepool_core::{Error, LightColor, Result, Scope, SensorReading, StatusCode, StepMode};

/// A call into the hardware control service.
///
/// Ids, channels, colors and step counts travel as raw numbers so that
/// out-of-range values reach the service and come back as
/// `InvalidArgument` instead of breaking the frame decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    Echo { payload: String },
    SetRelayState { channel: u8, engaged: bool },
    GetRelayStates,
    SetLightColor { light_id: u8, color: u8, scope: Scope },
    GetLightColors,
    GetTemperature,
    GetPh,
    MoveStepper {
        steps: i64,
        reverse: bool,
        #[serde(default)]
        mode: StepMode,
    },
    StopStepper,
    IsStepperActive,
    SetScope { scope: Scope },
    SetPhSampleTime { ms: u64 },
    GetPhSampleTime,
    SendPhCommand { command: String },
}

impl Request {
    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::Echo { .. } => "Echo",
            Request::SetRelayState { .. } => "SetRelayState",
            Request::GetRelayStates => "GetRelayStates",
            Request::SetLightColor { .. } => "SetLightColor",
            Request::GetLightColors => "GetLightColors",
            Request::GetTemperature => "GetTemperature",
            Request::GetPh => "GetPh",
            Request::MoveStepper { .. } => "MoveStepper",
            Request::StopStepper => "StopStepper",
            Request::IsStepperActive => "IsStepperActive",
            Request::SetScope { .. } => "SetScope",
            Request::SetPhSampleTime { .. } => "SetPhSampleTime",
            Request::GetPhSampleTime => "GetPhSampleTime",
            Request::SendPhCommand { .. } => "SendPhCommand",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    pub channel: u8,
    pub engaged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub light_id: u8,
    pub color: LightColor,
}

/// Successful result of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Response {
    Empty,
    Echo { payback: String },
    RelayStates { states: Vec<RelayState> },
    LightColors { states: Vec<LightState> },
    /// Degrees Celsius.
    Temperature { reading: SensorReading },
    Ph { reading: SensorReading },
    StepperState { active: bool },
    PhSampleTime { ms: u64 },
    PhCommand { response: String },
}

/// Outcome of a call: a status code plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default)]
    pub detail: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            detail: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl From<&Error> for Status {
    fn from(error: &Error) -> Self {
        Self {
            code: error.status_code(),
            detail: error.detail(),
        }
    }
}

/// The frame sent back for every [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: Status,
    pub body: Response,
}

impl Reply {
    pub fn ok(body: Response) -> Self {
        Self {
            status: Status::ok(),
            body,
        }
    }

    pub fn error(error: &Error) -> Self {
        Self {
            status: Status::from(error),
            body: Response::Empty,
        }
    }

    /// Turn a reply back into the service-side result.
    pub fn into_result(self) -> Result<Response> {
        match Error::from_status(self.status.code, self.status.detail) {
            None => Ok(self.body),
            Some(error) => Err(error),
        }
    }
}

impl From<Result<Response>> for Reply {
    fn from(result: Result<Response>) -> Self {
        match result {
            Ok(body) => Reply::ok(body),
            Err(error) => Reply::error(&error),
        }
    }
}
