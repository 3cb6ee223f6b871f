//! JSON messages exchanged with the lighting module.
//!
//! One request per datagram, one reply per request. Replies carry either a
//! `result` object or an `error` object:
//!
//! ```text
//! -> {"method":"setLight","params":{"id":3,"state":true,"brightness":70}}
//! <- {"method":"setLight","result":{"id":3,"name":"Table 3","zone":"table","state":true,"brightness":70}}
//! <- {"method":"setLight","error":{"code":-32602,"message":"Invalid params"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;
use crate::types::{Brightness, LightId, LightState, LightTarget, PowerState, Zone};

type Result<T> = std::result::Result<T, Error>;

/// A request understood by the module firmware.
///
/// # Examples
///
/// ```
/// use cuehall_lights::{Brightness, LightId, LightTarget, Request};
///
/// let req = Request::set_light(LightId(3), &LightTarget::brightness(Brightness::create(70).unwrap()));
/// assert_eq!(
///     serde_json::to_string(&req).unwrap(),
///     r#"{"method":"setLight","params":{"id":3,"brightness":70}}"#
/// );
/// assert_eq!(
///     serde_json::to_string(&Request::GetLights).unwrap(),
///     r#"{"method":"getLights"}"#
/// );
/// ```
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    /// Handshake: identity and firmware of the module.
    GetModuleInfo,
    /// Full state of every light.
    GetLights,
    /// Write one light.
    SetLight(SetLightParams),
}

impl Request {
    pub fn set_light(id: LightId, target: &LightTarget) -> Self {
        Request::SetLight(SetLightParams {
            id,
            state: target.power.map(|p| p.is_on()),
            brightness: target.brightness,
        })
    }

    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetModuleInfo => "getModuleInfo",
            Request::GetLights => "getLights",
            Request::SetLight(_) => "setLight",
        }
    }

    /// The light this request writes, if any.
    pub fn light(&self) -> Option<LightId> {
        match self {
            Request::SetLight(params) => Some(params.id),
            _ => None,
        }
    }
}

/// Parameters of a `setLight` request.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetLightParams {
    pub id: LightId,
    pub state: Option<bool>,
    pub brightness: Option<Brightness>,
}

/// One light as the module reports it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceLight {
    pub id: LightId,
    pub name: String,
    #[serde(default)]
    pub zone: Zone,
    pub state: bool,
    pub brightness: Brightness,
}

impl DeviceLight {
    pub fn light_state(&self) -> LightState {
        LightState::new(PowerState::from(self.state), self.brightness)
    }
}

/// Result of `getLights`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LightsReport {
    pub lights: Vec<DeviceLight>,
    /// Wi-Fi signal strength in dBm, when the firmware reports it.
    #[serde(default)]
    pub rssi: Option<i32>,
}

/// Result of `getModuleInfo`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub module_id: String,
    #[serde(default)]
    pub fw_version: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    code: i32,
    #[serde(default)]
    message: String,
}

/// Split a raw reply into its `result`, turning an `error` object into
/// [`Error::Device`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use cuehall_lights::{decode_reply, Error};
///
/// let ok = decode_reply(json!({"method": "getLights", "result": {"lights": []}})).unwrap();
/// assert_eq!(ok, json!({"lights": []}));
///
/// let err = decode_reply(json!({"method": "setLight", "error": {"code": -32602, "message": "Invalid params"}}));
/// assert!(matches!(err, Err(Error::Device { code: -32602, .. })));
/// ```
pub fn decode_reply(raw: Value) -> Result<Value> {
    let reply: Reply = serde_json::from_value(raw).map_err(Error::JsonLoad)?;
    if let Some(err) = reply.error {
        return Err(Error::Device {
            code: err.code,
            message: err.message,
        });
    }
    Ok(reply.result.unwrap_or(Value::Null))
}

/// Deserialize a decoded `result` into the expected shape.
pub(crate) fn parse_result<T: serde::de::DeserializeOwned>(result: Value) -> Result<T> {
    serde_json::from_value(result).map_err(Error::JsonLoad)
}
