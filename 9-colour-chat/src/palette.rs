use std::{fmt, str::FromStr};

const RESET_ESCAPE: &str = "\x1b[0m";

/// One entry of the fixed terminal colour palette a user can chat in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colour {
    Reset,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
    #[default]
    White,
}

impl Colour {
    pub const ALL: [Colour; 9] = [
        Colour::Reset,
        Colour::Red,
        Colour::Green,
        Colour::Yellow,
        Colour::Blue,
        Colour::Magenta,
        Colour::Cyan,
        Colour::Gray,
        Colour::White,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Colour::Reset => "reset",
            Colour::Red => "red",
            Colour::Green => "green",
            Colour::Yellow => "yellow",
            Colour::Blue => "blue",
            Colour::Magenta => "magenta",
            Colour::Cyan => "cyan",
            Colour::Gray => "gray",
            Colour::White => "white",
        }
    }

    /// ANSI SGR sequence that switches the terminal to this colour.
    pub fn escape(self) -> &'static str {
        match self {
            Colour::Reset => RESET_ESCAPE,
            Colour::Red => "\x1b[31m",
            Colour::Green => "\x1b[32m",
            Colour::Yellow => "\x1b[33m",
            Colour::Blue => "\x1b[34m",
            Colour::Magenta => "\x1b[35m",
            Colour::Cyan => "\x1b[36m",
            Colour::Gray => "\x1b[37m",
            Colour::White => "\x1b[97m",
        }
    }

    /// Comma separated palette, as shown to a user who picked an unknown colour.
    pub fn palette_listing() -> String {
        Colour::ALL
            .iter()
            .map(|colour| colour.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Frames a chat line as `<escape><name>: <text><reset>`.
    pub fn wrap_chat(self, name: &str, text: &str) -> String {
        format!("{}{name}: {text}{RESET_ESCAPE}", self.escape())
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColour(pub String);

impl FromStr for Colour {
    type Err = UnknownColour;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let folded = raw.trim().to_ascii_lowercase();
        Colour::ALL
            .into_iter()
            .find(|colour| colour.name() == folded)
            .ok_or(UnknownColour(folded))
    }
}
