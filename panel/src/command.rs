use std::{fmt::{Display, Formatter}, str::FromStr};

/// The five actuator commands of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Command {
    pub const ALL: [Command; 5] = [Self::Forward, Self::Backward, Self::Left, Self::Right, Self::Stop];

    /// Forward and backward repeat while loop mode is enabled.
    #[inline]
    pub fn is_repeatable(self) -> bool {
        matches!(self, Self::Forward | Self::Backward)
    }

    /// Key used in the settings file.
    pub fn key(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "f" => Ok(Self::Forward),
            "backward" | "b" => Ok(Self::Backward),
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            "stop" | "s" => Ok(Self::Stop),
            other => Err(format!("unknown command `{}`", other)),
        }
    }
}
