//! Terminal front end: parses user commands and drives the session.

use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::Serialize;

use crate::config::{clamp_level, LEVEL_MAX_DB, LEVEL_MIN_DB, LEVEL_STEP_DB};
use crate::gain::{Readout, Selector};
use crate::graph::AudioContext;
use crate::session::AudioSession;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Select(Selector),
    Toggle,
    Play,
    Stop,
    SetLevel(Selector, f32),
    SetLevels(f32, f32),
    Status,
    Help,
    Quit,
}

fn parse_selector(s: &str) -> Option<Selector> {
    match s {
        "a" => Some(Selector::A),
        "b" => Some(Selector::B),
        _ => None,
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let lower = line.trim().to_ascii_lowercase();
        let mut words = lower.split_whitespace();
        let Some(head) = words.next() else {
            bail!("empty command");
        };
        let rest: Vec<&str> = words.collect();

        let cmd = match (head, rest.as_slice()) {
            ("a" | "b", []) => Command::Select(parse_selector(head).unwrap_or(Selector::A)),
            ("a" | "b", [db]) => {
                let which = parse_selector(head).unwrap_or(Selector::A);
                Command::SetLevel(which, parse_db(db)?)
            }
            ("set", [which, db]) => {
                let which = parse_selector(which).ok_or_else(|| anyhow!("expected a or b, got {which:?}"))?;
                Command::SetLevel(which, parse_db(db)?)
            }
            ("levels" | "l", [a, b]) => Command::SetLevels(parse_db(a)?, parse_db(b)?),
            ("t" | "toggle" | "ab", []) => Command::Toggle,
            ("p" | "play", []) => Command::Play,
            ("s" | "stop", []) => Command::Stop,
            ("status" | "?", []) => Command::Status,
            ("h" | "help", []) => Command::Help,
            ("q" | "quit" | "exit", []) => Command::Quit,
            _ => bail!("unknown command {:?} (try `help`)", line.trim()),
        };
        Ok(cmd)
    }
}

fn parse_db(s: &str) -> anyhow::Result<f32> {
    let db: f32 = s.trim_end_matches("db").parse().map_err(|_| anyhow!("not a number: {s:?}"))?;
    if !db.is_finite() {
        bail!("level must be finite");
    }
    Ok(db)
}

pub fn help_text() -> String {
    format!(
        "commands:\n  \
         a | b            switch to A or B\n  \
         t | toggle       flip between A and B\n  \
         a <dB> | b <dB>  set a level ({LEVEL_MIN_DB}-{LEVEL_MAX_DB}, step {LEVEL_STEP_DB})\n  \
         set a|b <dB>     same as above\n  \
         levels <A> <B>   set both levels at once\n  \
         p | play         start the noise\n  \
         s | stop         stop the noise\n  \
         status           print levels and gains\n  \
         q | quit         exit"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub active: Selector,
    pub playing: bool,
    #[serde(flatten)]
    pub readout: Readout,
    /// Instantaneous gain of the live node while playing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_gain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_target: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_seconds: Option<f64>,
}

pub struct Controller<C: AudioContext> {
    session: AudioSession<C>,
    json: bool,
}

impl<C: AudioContext> Controller<C> {
    pub fn new(session: AudioSession<C>, json: bool) -> Self {
        Controller { session, json }
    }

    pub fn session(&self) -> &AudioSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AudioSession<C> {
        &mut self.session
    }

    pub fn handle(&mut self, cmd: Command) -> anyhow::Result<Outcome> {
        match cmd {
            Command::Select(which) => self.session.set_active(which),
            Command::Toggle => {
                let next = self.session.active().toggled();
                self.session.set_active(next);
            }
            Command::Play => {
                // the session ignores a second start, but keep the UI guard explicit
                if !self.session.is_playing() {
                    self.session.start()?;
                }
            }
            Command::Stop => self.session.stop(),
            Command::SetLevel(which, db) => self.session.set_level(which, clamp_level(db)),
            Command::SetLevels(a, b) => self.session.set_levels(clamp_level(a), clamp_level(b)),
            Command::Status | Command::Help => {}
            Command::Quit => {
                self.session.stop();
                return Ok(Outcome::Quit);
            }
        }
        Ok(Outcome::Continue)
    }

    pub fn status(&self) -> Status {
        let (db_a, db_b) = self.session.levels();
        let gain = self.session.gain_param();
        Status {
            active: self.session.active(),
            playing: self.session.is_playing(),
            readout: Readout::new(db_a, db_b),
            live_gain: gain.as_ref().map(|g| g.value()),
            live_target: gain.as_ref().and_then(|g| g.target()),
            clock_seconds: gain.as_ref().and(self.session.context()).map(|c| c.current_time()),
        }
    }

    /// One line describing the current state, as text or JSON.
    pub fn render_status(&self) -> String {
        let status = self.status();
        if self.json {
            return serde_json::to_string(&status).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
        }
        let marker = |s: Selector| if s == status.active { "●" } else { "○" };
        let mut line = format!(
            "{} A {:.1} dB  {} B {:.1} dB  [{}]  {}",
            marker(Selector::A),
            status.readout.db_a,
            marker(Selector::B),
            status.readout.db_b,
            if status.playing { "Stop" } else { "Play" },
            status.readout
        );
        if let Some(g) = status.live_gain {
            line.push_str(&format!("  • now {g:.3}"));
            if let Some(t) = status.live_target {
                line.push_str(&format!(" → {t:.3}"));
            }
        }
        line
    }
}
