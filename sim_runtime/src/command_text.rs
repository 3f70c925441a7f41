use std::num::ParseIntError;

use thiserror::Error;

use crate::controller::UserAction;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Parse one line typed at the headless viewer prompt.
///
/// ```text
/// pause | resume | toggle
/// reset [molecule_limit] [seed]
/// limit <value> | more [steps] | less [steps]
/// viewport <width> <height>
/// quit
/// ```
pub fn parse_command_line(input: &str) -> Result<UserAction, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "pause" => Ok(UserAction::Pause),
        "resume" | "play" => Ok(UserAction::Resume),
        "toggle" | "p" => Ok(UserAction::TogglePause),
        "reset" => {
            let molecule_limit = parts
                .next()
                .map(|value| parse_positive_u32(value, "reset molecule_limit"))
                .transpose()?;
            let seed = parts
                .next()
                .map(|value| parse_u64(value, "reset seed"))
                .transpose()?;
            Ok(UserAction::Reset {
                molecule_limit,
                seed,
            })
        }
        "limit" | "cap" => {
            let value_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("value"))?;
            let value = parse_positive_u32(value_str, "molecule limit")?;
            Ok(UserAction::SetMoleculeLimit(value))
        }
        "more" | "+" => {
            let steps = parse_steps(parts.next())?;
            Ok(UserAction::NudgeMoleculeLimit(steps))
        }
        "less" | "-" => {
            let steps = parse_steps(parts.next())?;
            Ok(UserAction::NudgeMoleculeLimit(-steps))
        }
        "viewport" => {
            let width_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("width"))?;
            let height_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("height"))?;
            let width = parse_positive_u32(width_str, "viewport width")?;
            let height = parse_positive_u32(height_str, "viewport height")?;
            Ok(UserAction::Resize { width, height })
        }
        "quit" | "exit" | "q" => Ok(UserAction::Shutdown),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_steps(value: Option<&str>) -> Result<i32, CommandParseError> {
    let Some(value) = value else {
        return Ok(1);
    };
    let steps = parse_positive_u32(value, "steps")?;
    Ok(i32::try_from(steps).unwrap_or(i32::MAX))
}

fn parse_positive_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    let parsed = value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })?;
    if parsed == 0 {
        return Err(CommandParseError::NotPositive(context));
    }
    Ok(parsed)
}

fn parse_u64(value: &str, context: &'static str) -> Result<u64, CommandParseError> {
    value
        .parse::<u64>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}
