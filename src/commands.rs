// Command classes understood by the host framework
//
// The numeric IDs are shared with the host and must never drift. The enum is
// the single source; the table is checked for duplicates at compile time.

use serde::{Deserialize, Serialize};

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandClass {
    SwitchBinary = 0x0025,
    SwitchMultilevel = 0x0026,
    CameraPreview = 0x2200,
    CameraPhoto = 0x2201,
    CameraVideo = 0x2202,
    CameraStream = 0x2203,
    Motor = 0x3100,
}

/// (class, host description) for every known command class
pub const COMMAND_CLASSES: [(CommandClass, &str); 7] = [
    (CommandClass::SwitchBinary, "COMMAND_SWITCH_BINARY"),
    (CommandClass::SwitchMultilevel, "COMMAND_SWITCH_MULTILEVEL"),
    (CommandClass::CameraPreview, "COMMAND_CAMERA_PREVIEW"),
    (CommandClass::CameraPhoto, "COMMAND_CAMERA_PHOTO"),
    (CommandClass::CameraVideo, "COMMAND_CAMERA_VIDEO"),
    (CommandClass::CameraStream, "COMMAND_CAMERA_STREAM"),
    (CommandClass::Motor, "COMMAND_MOTOR"),
];

impl CommandClass {
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        COMMAND_CLASSES
            .iter()
            .map(|&(class, _)| class)
            .find(|class| class.id() == id)
    }

    pub fn description(self) -> &'static str {
        COMMAND_CLASSES
            .iter()
            .find(|&&(class, _)| class == self)
            .map_or("COMMAND_UNKNOWN", |&(_, description)| description)
    }
}

// Each class listed once
const _: () = {
    let mut i = 0;
    while i < COMMAND_CLASSES.len() {
        let mut j = i + 1;
        while j < COMMAND_CLASSES.len() {
            assert!(
                COMMAND_CLASSES[i].0 as u16 != COMMAND_CLASSES[j].0 as u16,
                "command class listed twice"
            );
            j += 1;
        }
        i += 1;
    }
};
