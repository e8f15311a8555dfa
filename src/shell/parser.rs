//! Splitting input lines into commands and commands into typed requests

use std::cmp::Ordering;

use crate::constants::{MAX_ARGS_SIZE, MAX_COMMANDS_PER_LINE, MAX_USER_INPUT};
use crate::policy::Policy;

use super::ShellError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Set { var: String, values: Vec<String> },
    Print { var: String },
    Echo { text: String },
    Run { script: String },
    Exec {
        scripts: Vec<String>,
        policy: Policy,
        background: bool,
        concurrent: bool,
    },
    Ls,
    Touch { name: String },
    Mkdir { name: String },
    Cd { dir: String },
}

/// Split one input line on `;`
pub fn split_commands(input: &str) -> Result<Vec<&str>, ShellError> {
    if input.len() > MAX_USER_INPUT {
        return Err(ShellError::InputTooLong);
    }
    let commands: Vec<&str> = input.split(';').collect();
    if commands.len() > MAX_COMMANDS_PER_LINE {
        return Err(ShellError::TooManyCommands);
    }
    Ok(commands)
}

pub fn tokenize(command: &str) -> Vec<&str> {
    command.split_whitespace().collect()
}

pub fn parse(tokens: &[&str]) -> Result<Command, ShellError> {
    let Some(&name) = tokens.first() else {
        return Err(ShellError::UnknownCommand);
    };
    if tokens.len() > MAX_ARGS_SIZE {
        return Err(ShellError::TooManyTokens);
    }
    let args = &tokens[1..];
    let single = || match args {
        [arg] => Ok(arg.to_string()),
        _ => Err(ShellError::UnknownCommand),
    };
    let none = |command: Command| {
        if args.is_empty() {
            Ok(command)
        } else {
            Err(ShellError::UnknownCommand)
        }
    };

    match name {
        "help" => none(Command::Help),
        "quit" => none(Command::Quit),
        "my_ls" => none(Command::Ls),
        "set" => match args {
            [var, values @ ..] if !values.is_empty() => Ok(Command::Set {
                var: var.to_string(),
                values: values.iter().map(|v| v.to_string()).collect(),
            }),
            _ => Err(ShellError::UnknownCommand),
        },
        "print" => single().map(|var| Command::Print { var }),
        "echo" => single().map(|text| Command::Echo { text }),
        "run" => single().map(|script| Command::Run { script }),
        "my_touch" => single().map(|name| Command::Touch { name }),
        "my_mkdir" => single().map(|name| Command::Mkdir { name }),
        "my_cd" => single().map(|dir| Command::Cd { dir }),
        "exec" => parse_exec(tokens),
        _ => Err(ShellError::UnknownCommand),
    }
}

/// `exec S1 [S2 [S3 ...]] POLICY [#] [MT]`
fn parse_exec(tokens: &[&str]) -> Result<Command, ShellError> {
    if tokens.len() < 3 {
        return Err(ShellError::UnknownCommand);
    }
    let mut end = tokens.len();
    let concurrent = tokens[end - 1] == "MT";
    if concurrent {
        end -= 1;
    }
    let background = tokens[end - 1] == "#";
    if background {
        end -= 1;
    }
    if end < 3 {
        return Err(ShellError::UnknownCommand);
    }
    let policy: Policy = tokens[end - 1]
        .parse()
        .map_err(|_| ShellError::UnknownCommand)?;
    let scripts = tokens[1..end - 1].iter().map(|s| s.to_string()).collect();
    Ok(Command::Exec {
        scripts,
        policy,
        background,
        concurrent,
    })
}

#[inline]
pub fn is_alphanumeric(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Directory listing order: digits before letters, letters compared
/// case-insensitively with uppercase first on a tie, a prefix before any
/// longer name
pub fn listing_order(a: &str, b: &str) -> Ordering {
    for (x, y) in a.bytes().zip(b.bytes()) {
        if x.is_ascii_digit() && y.is_ascii_alphabetic() {
            return Ordering::Less;
        }
        if x.is_ascii_alphabetic() && y.is_ascii_digit() {
            return Ordering::Greater;
        }
        let (lx, ly) = (x.to_ascii_lowercase(), y.to_ascii_lowercase());
        if lx != ly {
            return lx.cmp(&ly);
        }
        if x != y {
            return x.cmp(&y);
        }
    }
    a.len().cmp(&b.len())
}
