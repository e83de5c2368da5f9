use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Kind of instruction carried by a [`Command`]. The discriminant is the
/// code sent on the wire in the `ty` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum CommandType {
    NoneAvailable = 0,
    SetPollRate = 1,
    SetRailState = 2,
}

/// Sensor targets addressed by [`CommandType::SetPollRate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandSensor {
    Adcs = 0,
    Lis3mdl = 1,
    Lsm6dso = 2,
    Sht4x = 3,
}

/// Power rails addressed by [`CommandType::SetRailState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandRail {
    Rail5vh = 0,
}

const COMMAND_TYPE_LABELS: [(CommandType, &str); 3] = [
    (CommandType::NoneAvailable, "None Available"),
    (CommandType::SetPollRate, "Set Poll Rate"),
    (CommandType::SetRailState, "Set Rail State"),
];

const COMMAND_SENSOR_LABELS: [(CommandSensor, &str); 4] = [
    (CommandSensor::Adcs, "ADCS"),
    (CommandSensor::Lis3mdl, "LIS3MDL"),
    (CommandSensor::Lsm6dso, "LSM6DSO"),
    (CommandSensor::Sht4x, "SHT4X"),
];

const COMMAND_RAIL_LABELS: [(CommandRail, &str); 1] = [(CommandRail::Rail5vh, "5VH Rail")];

impl CommandType {
    pub fn label(&self) -> &'static str {
        COMMAND_TYPE_LABELS
            .iter()
            .find(|(ty, _)| ty == self)
            .map(|(_, label)| *label)
            .unwrap_or_default()
    }
}

impl CommandSensor {
    pub fn label(&self) -> &'static str {
        COMMAND_SENSOR_LABELS
            .iter()
            .find(|(sensor, _)| sensor == self)
            .map(|(_, label)| *label)
            .unwrap_or_default()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        COMMAND_SENSOR_LABELS
            .iter()
            .map(|(sensor, _)| *sensor)
            .find(|sensor| *sensor as u32 == code)
    }
}

impl CommandRail {
    pub fn label(&self) -> &'static str {
        COMMAND_RAIL_LABELS
            .iter()
            .find(|(rail, _)| rail == self)
            .map(|(_, label)| *label)
            .unwrap_or_default()
    }

    pub fn from_code(code: u32) -> Option<Self> {
        COMMAND_RAIL_LABELS
            .iter()
            .map(|(rail, _)| *rail)
            .find(|rail| *rail as u32 == code)
    }
}

impl TryFrom<u8> for CommandType {
    type Error = ProtoError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        COMMAND_TYPE_LABELS
            .iter()
            .map(|(ty, _)| *ty)
            .find(|ty| *ty as u8 == code)
            .ok_or(ProtoError::UnknownCommandType(code))
    }
}

impl From<CommandType> for u8 {
    fn from(ty: CommandType) -> u8 {
        ty as u8
    }
}

/// A queued instruction for one device. A command has no identity of its
/// own beyond its position in that device's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command type
    pub ty: CommandType,
    /// Target code, a [`CommandSensor`] or [`CommandRail`] depending on `ty`
    pub ta: u32,
    /// Integer argument, e.g. a poll interval in ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<i64>,
    /// Boolean argument, e.g. a rail state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<bool>,
}

impl Command {
    /// Sentinel handed to devices when their queue is empty
    pub fn none_available() -> Self {
        Self {
            ty: CommandType::NoneAvailable,
            ta: 0,
            i: None,
            b: None,
        }
    }

    /// Label of the addressed target, resolved against the lookup table
    /// that matches the command type
    pub fn target_label(&self) -> Option<&'static str> {
        match self.ty {
            CommandType::NoneAvailable => None,
            CommandType::SetPollRate => CommandSensor::from_code(self.ta).map(|s| s.label()),
            CommandType::SetRailState => CommandRail::from_code(self.ta).map(|r| r.label()),
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, ProtoError> {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(self, &mut buffer)
            .map_err(|e| ProtoError::Encode(e.to_string()))?;
        Ok(buffer)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ProtoError> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtoError::Decode(e.to_string()))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ty.label())?;
        match self.target_label() {
            Some(target) => write!(f, " -> {target}")?,
            None => write!(f, " -> target {}", self.ta)?,
        }
        if let Some(i) = self.i {
            write!(f, " i={i}")?;
        }
        if let Some(b) = self.b {
            write!(f, " b={b}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;

    #[test]
    fn sentinel_encodes_as_two_zero_fields() {
        let bytes = Command::none_available().to_cbor().unwrap();
        let value: Value = ciborium::de::from_reader(&bytes[..]).unwrap();
        let map = value.as_map().expect("sentinel should be a map");
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].0, Value::Text("ty".into()));
        assert_eq!(map[0].1, Value::Integer(0.into()));
        assert_eq!(map[1].0, Value::Text("ta".into()));
        assert_eq!(map[1].1, Value::Integer(0.into()));
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let cmd = Command {
            ty: CommandType::SetPollRate,
            ta: CommandSensor::Lsm6dso as u32,
            i: Some(500),
            b: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json, serde_json::json!({"ty": 1, "ta": 2, "i": 500}));
        assert_eq!(Command::from_cbor(&cmd.to_cbor().unwrap()).unwrap(), cmd);
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        let res = serde_json::from_value::<Command>(serde_json::json!({"ty": 9, "ta": 0}));
        assert!(res.is_err());
        assert!(matches!(
            CommandType::try_from(9),
            Err(ProtoError::UnknownCommandType(9))
        ));
    }

    #[test]
    fn target_labels_follow_command_type() {
        let poll = Command {
            ty: CommandType::SetPollRate,
            ta: 3,
            i: Some(1000),
            b: None,
        };
        assert_eq!(poll.target_label(), Some("SHT4X"));

        let rail = Command {
            ty: CommandType::SetRailState,
            ta: 0,
            i: None,
            b: Some(true),
        };
        assert_eq!(rail.target_label(), Some("5VH Rail"));
        assert_eq!(rail.to_string(), "Set Rail State -> 5VH Rail b=true");

        assert_eq!(Command::none_available().target_label(), None);
        assert_eq!(CommandType::NoneAvailable.label(), "None Available");
    }
}
