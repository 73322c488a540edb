//! Edit scripts for headless sessions.
//!
//! One command per line; blank lines and lines starting with `#` are
//! ignored. Points are written `x,y`.
//!
//! ```text
//! rect <left> <top> <width> <height> [fill]
//! circle <left> <top> <radius> [fill]
//! text <left> <top> <size> <content...>
//! path <stroke-width> <stroke> <x,y> <x,y>...
//! polygon <fill> <x,y> <x,y> <x,y>...
//! remove <index>
//! lock <index>
//! unlock
//! background <color>
//! undo
//! redo
//! wait <ms>
//! ```

use std::time::Duration;

use sketchsync_core::Shape;
use sketchsync_session::{EditorSession, SessionError};
use sketchsync_sync::HeadlessSurface;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_FILL: &str = "#000000";

/// A script line that could not be parsed
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(Shape),
    Remove(usize),
    Lock(usize),
    UnlockAll,
    Background(String),
    Undo,
    Redo,
    Wait(Duration),
}

/// A parsed command with its 1-based line number
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub command: Command,
}

/// What running a script did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    /// Commands that were valid but could not be carried out.
    pub skipped: usize,
}

pub fn parse(source: &str) -> Result<Vec<Line>, ScriptError> {
    let mut lines = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let command = parse_command(text).map_err(|message| ScriptError {
            line: index + 1,
            message,
        })?;
        lines.push(Line {
            number: index + 1,
            command,
        });
    }
    Ok(lines)
}

fn parse_command(text: &str) -> Result<Command, String> {
    let mut words = text.split_whitespace();
    let Some(keyword) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match keyword {
        "rect" => {
            expect_args(&args, 4, 5)?;
            Command::Add(Shape::rect(
                number(args[0])?,
                number(args[1])?,
                number(args[2])?,
                number(args[3])?,
                args.get(4).copied().unwrap_or(DEFAULT_FILL),
            ))
        }
        "circle" => {
            expect_args(&args, 3, 4)?;
            Command::Add(Shape::circle(
                number(args[0])?,
                number(args[1])?,
                number(args[2])?,
                args.get(3).copied().unwrap_or(DEFAULT_FILL),
            ))
        }
        "text" => {
            if args.len() < 4 {
                return Err("text needs <left> <top> <size> <content...>".to_string());
            }
            Command::Add(Shape::text(
                number(args[0])?,
                number(args[1])?,
                &args[3..].join(" "),
                number(args[2])?,
                DEFAULT_FILL,
            ))
        }
        "path" => {
            if args.len() < 4 {
                return Err("path needs <stroke-width> <stroke> and at least two points".to_string());
            }
            let points = points(&args[2..])?;
            Command::Add(Shape::path(&points, args[1], number(args[0])?))
        }
        "polygon" => {
            if args.len() < 4 {
                return Err("polygon needs <fill> and at least three points".to_string());
            }
            let points = points(&args[1..])?;
            Command::Add(Shape::polygon(&points, args[0]))
        }
        "remove" => {
            expect_args(&args, 1, 1)?;
            Command::Remove(index(args[0])?)
        }
        "lock" => {
            expect_args(&args, 1, 1)?;
            Command::Lock(index(args[0])?)
        }
        "unlock" => {
            expect_args(&args, 0, 0)?;
            Command::UnlockAll
        }
        "background" => {
            expect_args(&args, 1, 1)?;
            Command::Background(args[0].to_string())
        }
        "undo" => {
            expect_args(&args, 0, 0)?;
            Command::Undo
        }
        "redo" => {
            expect_args(&args, 0, 0)?;
            Command::Redo
        }
        "wait" => {
            expect_args(&args, 1, 1)?;
            let ms: u64 = args[0]
                .parse()
                .map_err(|_| format!("invalid duration '{}'", args[0]))?;
            Command::Wait(Duration::from_millis(ms))
        }
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn expect_args(args: &[&str], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(format!("expected {expected} arguments, got {}", args.len()));
    }
    Ok(())
}

fn number(word: &str) -> Result<f64, String> {
    match word.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("invalid number '{word}'")),
    }
}

fn index(word: &str) -> Result<usize, String> {
    word.parse().map_err(|_| format!("invalid index '{word}'"))
}

fn points(words: &[&str]) -> Result<Vec<(f64, f64)>, String> {
    words
        .iter()
        .map(|word| {
            let (x, y) = word
                .split_once(',')
                .ok_or_else(|| format!("invalid point '{word}', expected x,y"))?;
            Ok((number(x)?, number(y)?))
        })
        .collect()
}

/// Run `lines` against an open session on a headless surface.
///
/// Commands that cannot be carried out (bad index, busy session, failed
/// apply) are logged and skipped; the rest of the script still runs.
pub async fn run(session: &EditorSession, surface: &HeadlessSurface, lines: &[Line]) -> RunSummary {
    let mut summary = RunSummary::default();
    for line in lines {
        let done = match &line.command {
            Command::Add(shape) => {
                surface.add(shape.clone());
                true
            }
            Command::Remove(index) => surface.remove(*index).is_some(),
            Command::Lock(index) => surface.lock(*index),
            Command::UnlockAll => {
                surface.unlock_all();
                true
            }
            Command::Background(color) => {
                surface.set_background(color.clone());
                true
            }
            Command::Undo => history_step(session.undo().await, line.number, "undo"),
            Command::Redo => history_step(session.redo().await, line.number, "redo"),
            Command::Wait(duration) => {
                tokio::time::sleep(*duration).await;
                true
            }
        };
        if done {
            summary.executed += 1;
        } else {
            warn!(line = line.number, command = ?line.command, "skipped");
            summary.skipped += 1;
        }
    }
    summary
}

fn history_step(
    result: Result<Option<sketchsync_core::Snapshot>, SessionError>,
    line: usize,
    what: &str,
) -> bool {
    match result {
        Ok(Some(_)) => true,
        Ok(None) => {
            info!(line, "nothing to {what}");
            false
        }
        Err(e) => {
            warn!(line, error = %e, "{what} failed");
            false
        }
    }
}
