//! Line parsing for both session states.

use crate::error::ProtocolError;

/// A line read before the user has authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCommand<'a> {
    Login { username: &'a str, password: &'a str },
    Register { username: &'a str, password: &'a str },
    Exit,
}

/// `exit` is recognised by its first token alone; `login` and `register` need
/// exactly a username and a password after the verb.
pub fn parse_auth(line: &str) -> Result<AuthCommand<'_>, ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() == Some(&"exit") {
        return Ok(AuthCommand::Exit);
    }

    let &[verb, username, password] = tokens.as_slice() else {
        return Err(ProtocolError::WrongArgumentCount);
    };
    match verb {
        "login" => Ok(AuthCommand::Login { username, password }),
        "register" => Ok(AuthCommand::Register { username, password }),
        _ => Err(ProtocolError::UnknownCommand),
    }
}

/// A line read while chatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    /// `/color <name>`; the argument is passed on unparsed.
    Colour(&'a str),
    Help,
    Members,
    Logout,
    Exit,
    Say(&'a str),
}

pub fn parse_chat(line: &str) -> ChatCommand<'_> {
    if let Some(rest) = line.strip_prefix("/color") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return ChatCommand::Colour(rest.trim());
        }
    }

    match line {
        "/help" => ChatCommand::Help,
        "/members" => ChatCommand::Members,
        "/logout" => ChatCommand::Logout,
        "/exit" => ChatCommand::Exit,
        text => ChatCommand::Say(text),
    }
}
