//! Line-oriented console front end
//!
//! Plain lines are sent as questions; lines starting with `/` are commands.
//! [`Printer`] turns successive snapshots into the lines to show.

use crate::conversation::{
    Confidence, ConversationMode, ExplainAction, ExplainStyle, QuizAction, Role, Topic, UserInput,
};
use crate::coordinator::{Phase, Snapshot, UserFacingError};
use crate::db::SessionRecord;
use crate::runtime::Command;
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

pub const HELP: &str = "\
Type a question and press enter. Commands:
  /mode solve|explain|exam|quiz   switch mode
  /new                            start a new session
  /retry  /cancel                 retry the last failure, cancel the request
  /edit <text>                    replace your last message and resend
  /image <path> [text]            send an image with optional text
  /deeper /differently /verify    explain follow-ups
  /similar /harder /newtopic      quiz follow-ups
  /check <title> | <problem> | <answer>   check a quiz answer
  /stuck [step]                   help with one step of the last solution
  /confidence low|medium|high     tell the tutor how sure you are
  /refresher [topic]              quick refresher
  /steps on|off  /style intuition|equation
  /sessions  /open <n>            list stored sessions, reopen one
  /bookmark <n>  /progress  /help  /quit";

/// What one console line asks for
#[derive(Debug, Clone)]
pub enum ConsoleInput {
    Command(Command),
    Progress,
    /// List recent stored sessions
    Sessions,
    /// Reopen entry `n` (0-based) of the session listing
    Open(usize),
    Help,
    Quit,
    Nothing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Unknown command /{0} (try /help)")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("{0}")]
    Invalid(String),
}

pub fn parse_line(line: &str) -> Result<ConsoleInput, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleInput::Nothing);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ConsoleInput::Command(Command::Send(UserInput::text(line))));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = |c: Command| Ok(ConsoleInput::Command(c));
    let send = |input: UserInput| Ok(ConsoleInput::Command(Command::Send(input)));

    match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Ok(ConsoleInput::Quit),
        "help" => Ok(ConsoleInput::Help),
        "progress" => Ok(ConsoleInput::Progress),
        "sessions" => Ok(ConsoleInput::Sessions),
        "open" => arg
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(|n| ConsoleInput::Open(n - 1))
            .ok_or(InputError::Usage("/open <number from /sessions>")),
        "mode" => command(Command::SwitchMode(parse_arg(arg)?)),
        "new" => command(Command::NewSession),
        "retry" => command(Command::Retry),
        "cancel" => command(Command::Cancel),
        "edit" if !arg.is_empty() => command(Command::Edit(arg.to_string())),
        "edit" => Err(InputError::Usage("/edit <text>")),
        "image" => {
            let (path, text) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
            if path.is_empty() {
                return Err(InputError::Usage("/image <path> [text]"));
            }
            command(Command::SendImage {
                text: text.trim().to_string(),
                path: PathBuf::from(path),
            })
        }
        "deeper" => send(UserInput::explain(ExplainAction::Deeper)),
        "differently" => send(UserInput::explain(ExplainAction::Differently)),
        "verify" => send(UserInput::explain(ExplainAction::Verify)),
        "similar" => send(UserInput::quiz(QuizAction::Similar)),
        "harder" => send(UserInput::quiz(QuizAction::Harder)),
        "newtopic" => send(UserInput::quiz(QuizAction::NewTopic)),
        "check" => {
            let parts: Vec<&str> = arg.splitn(3, '|').map(str::trim).collect();
            match parts.as_slice() {
                [title, problem, answer] if !problem.is_empty() && !answer.is_empty() => {
                    send(UserInput::quiz_check(title, problem, answer))
                }
                _ => Err(InputError::Usage("/check <title> | <problem> | <answer>")),
            }
        }
        "stuck" => {
            let step = if arg.is_empty() {
                None
            } else {
                Some(
                    arg.parse::<u32>()
                        .map_err(|_| InputError::Usage("/stuck [step number]"))?,
                )
            };
            command(Command::Stuck(step))
        }
        "confidence" => {
            let confidence: Confidence = parse_arg(arg)?;
            send(UserInput::text(confidence.message()))
        }
        "refresher" => {
            let topic = if arg.is_empty() {
                None
            } else {
                Some(parse_arg::<Topic>(arg)?)
            };
            command(Command::Refresher(topic))
        }
        "steps" => match arg {
            "on" => command(Command::SetShowSteps(true)),
            "off" => command(Command::SetShowSteps(false)),
            _ => Err(InputError::Usage("/steps on|off")),
        },
        "style" => command(Command::SetExplainStyle(parse_arg::<ExplainStyle>(arg)?)),
        "bookmark" => {
            let n: usize = arg
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(InputError::Usage("/bookmark <message number>"))?;
            command(Command::ToggleBookmark(n - 1))
        }
        other => Err(InputError::UnknownCommand(other.to_string())),
    }
}

fn parse_arg<T>(arg: &str) -> Result<T, InputError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    arg.parse().map_err(|e: T::Err| InputError::Invalid(e.to_string()))
}

/// Tracks what has been printed and reports only what is new
#[derive(Debug, Default)]
pub struct Printer {
    seen_messages: usize,
    last_error: Option<UserFacingError>,
    advisory_shown: bool,
    last_nudge: Option<Topic>,
    was_sending: bool,
}

impl Printer {
    /// Printer that treats everything in `snapshot` as already shown
    pub fn caught_up(snapshot: &Snapshot) -> Self {
        Self {
            seen_messages: snapshot.messages.len(),
            last_error: snapshot.error.clone(),
            advisory_shown: false,
            last_nudge: snapshot.refresher_nudge,
            was_sending: snapshot.phase.is_sending(),
        }
    }

    pub fn update(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(advisory) = snapshot.advisory.as_ref().filter(|_| !self.advisory_shown) {
            self.advisory_shown = true;
            lines.push(format!("! {advisory}"));
        }

        // Edits and new sessions shrink the transcript
        self.seen_messages = self.seen_messages.min(snapshot.messages.len());
        for message in snapshot.messages.iter().skip(self.seen_messages) {
            if message.role == Role::Assistant {
                lines.push(format!("tutor> {}", message.content));
                if message.problem_count > 0 {
                    lines.push(format!(
                        "({} problem(s); answer with /check <title> | <problem> | <answer>)",
                        message.problem_count
                    ));
                }
            }
        }
        self.seen_messages = snapshot.messages.len();

        let sending = snapshot.phase.is_sending();
        if sending && !self.was_sending {
            lines.push("(thinking...)".to_string());
        }
        if snapshot.phase == Phase::Cancelled && self.was_sending {
            lines.push("(cancelled)".to_string());
        }
        self.was_sending = sending;

        if snapshot.error != self.last_error {
            if let Some(error) = &snapshot.error {
                let mut line = format!("error: {}", error.message);
                if let Some(suggestion) = &error.suggestion {
                    let _ = write!(line, " {suggestion}");
                }
                if snapshot.can_retry {
                    line.push_str(" (/retry to resend)");
                }
                lines.push(line);
            }
            self.last_error.clone_from(&snapshot.error);
        }

        if snapshot.refresher_nudge != self.last_nudge {
            if let Some(topic) = snapshot.refresher_nudge {
                lines.push(format!(
                    "You've missed {topic} twice. Type /refresher for a quick review."
                ));
            }
            self.last_nudge = snapshot.refresher_nudge;
        }

        lines
    }
}

pub fn describe_progress(snapshot: &Snapshot) -> String {
    let progress = &snapshot.progress;
    let state = &snapshot.mode_state;
    let mut out = format!("Mode: {} | Session: {}\n", snapshot.mode, snapshot.title);

    let covered: Vec<String> = progress.covered.iter().map(ToString::to_string).collect();
    let _ = writeln!(
        out,
        "Topics covered: {}",
        if covered.is_empty() {
            "none yet".to_string()
        } else {
            covered.join(", ")
        }
    );
    let _ = writeln!(out, "Streak: {} day(s)", progress.streak.count);
    if snapshot.mode == ConversationMode::Exam || state.exam_total > 0 {
        let _ = writeln!(out, "Exam score: {}/{}", state.exam_correct, state.exam_total);
    }
    if snapshot.mode == ConversationMode::Quiz || state.quiz_total > 0 {
        let _ = writeln!(out, "Quiz score: {}/{}", state.quiz_correct, state.quiz_total);
    }
    for (topic, count) in &progress.mistakes {
        let _ = writeln!(out, "Mistakes on {topic}: {count}");
    }
    out.trim_end().to_string()
}

pub fn describe_sessions(records: &[SessionRecord]) -> String {
    if records.is_empty() {
        return "No saved sessions.".to_string();
    }
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "  {}. {} [{}] {} message(s), updated {}",
                i + 1,
                r.title,
                r.mode,
                r.transcript.len(),
                r.updated_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
