//! Textual command surface exposed to the host.

use std::fmt;
use std::str::FromStr;

use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `QUERY_FILAMENT_WIDTH`
    Query,
    /// `RESET_FILAMENT_WIDTH_SENSOR`
    Reset,
    /// `DISABLE_FILAMENT_WIDTH_SENSOR`
    Disable,
    /// `ENABLE_FILAMENT_WIDTH_SENSOR`
    Enable,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Query,
        Command::Reset,
        Command::Disable,
        Command::Enable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Query => "QUERY_FILAMENT_WIDTH",
            Command::Reset => "RESET_FILAMENT_WIDTH_SENSOR",
            Command::Disable => "DISABLE_FILAMENT_WIDTH_SENSOR",
            Command::Enable => "ENABLE_FILAMENT_WIDTH_SENSOR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = SensorError;

    /// Names are matched case-insensitively, like host G-code commands.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Command::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SensorError::UnknownCommand(wanted.to_string()))
    }
}

// Response texts.
pub const MSG_NOT_PRESENT: &str = "Filament NOT present";
pub const MSG_CLEARED: &str = "Filament width measurements cleared!";
pub const MSG_TURNED_ON: &str = "Filament width sensor Turned On";
pub const MSG_ALREADY_ON: &str = "Filament width sensor is already On";
pub const MSG_TURNED_OFF: &str = "Filament width sensor Turned Off";
pub const MSG_ALREADY_OFF: &str = "Filament width sensor is already Off";

pub fn diameter_message(diameter_mm: f64) -> String {
    format!("Filament dia (measured mm): {diameter_mm:.3}")
}
