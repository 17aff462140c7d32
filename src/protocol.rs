// Line protocol from the upstream controller
//
//   VEL <vx> <vy> <w>
//   MODE MANUAL | MODE AI
//   PING
//
// Lines end with `\n` or `\r`. Unknown or incomplete lines are dropped
// without touching the drive and without counting as traffic for the
// watchdog.

use std::time::Instant;

use tracing::{debug, warn};

use crate::config::MAX_LINE_LEN;
use crate::link::{Link, Result};
use crate::messages::{BodyVelocity, Command, ControlMode, Reply};
use crate::motor::{DriveController, MotorActuator};

/// Keep printable ASCII only, then trim
pub fn clean_line(raw: &[u8]) -> String {
    let printable: String = raw
        .iter()
        .filter(|b| (32..=126).contains(*b))
        .map(|&b| b as char)
        .collect();
    printable.trim().to_string()
}

/// Lenient number conversion
///
/// Drops everything except digits, `-`, `.` and `,`, reads `,` as the
/// decimal point, then converts the longest leading number. Anything
/// unreadable or out of `f32` range becomes 0.0.
pub fn parse_number(field: &str) -> f32 {
    let cleaned: String = field
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let bytes = cleaned.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    cleaned[..end]
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse one cleaned line into a command
pub fn parse_line(line: &str) -> Option<Command> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        ["VEL", vx, vy, w, ..] => Some(Command::Vel(BodyVelocity::new(
            parse_number(vx),
            parse_number(vy),
            parse_number(w),
        ))),
        ["MODE", rest @ ..] => {
            let mode = match rest.first() {
                Some(&"MANUAL") => Some(ControlMode::Manual),
                Some(&"AI") => Some(ControlMode::ClosedLoop),
                _ => None,
            };
            Some(Command::Mode(mode))
        }
        ["PING", ..] => Some(Command::Ping),
        _ => None,
    }
}

/// Buffers the inbound stream into lines and dispatches them into the drive
pub struct CommandChannel {
    buffer: Vec<u8>,
    // Set while skipping the rest of an over-long line
    overflowed: bool,
    last_accepted: Instant,
}

impl CommandChannel {
    pub fn new(now: Instant) -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
            overflowed: false,
            last_accepted: now,
        }
    }

    /// When the last recognized command arrived
    pub fn last_accepted(&self) -> Instant {
        self.last_accepted
    }

    /// Drain the bytes available on `link` without waiting
    ///
    /// Complete lines are parsed and applied to `drive` in arrival order,
    /// acknowledgments go back out on `link`. A failed acknowledgment is
    /// logged and the rest of the input is still dispatched. Returns the
    /// number of accepted commands.
    pub fn poll<L, A>(
        &mut self,
        link: &mut L,
        drive: &mut DriveController<A>,
        now: Instant,
    ) -> Result<usize>
    where
        L: Link + ?Sized,
        A: MotorActuator,
    {
        let mut chunk = [0u8; 64];
        let mut accepted = 0;

        loop {
            let n = link.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }

            for &byte in &chunk[..n] {
                let Some(line) = self.push_byte(byte) else {
                    continue;
                };
                let Some(command) = parse_line(&line) else {
                    debug!("Ignoring line {:?}", line);
                    continue;
                };

                accepted += 1;
                if let Some(reply) = self.dispatch(command, drive, now) {
                    if let Err(e) = link.write_line(&reply.to_string()) {
                        warn!("Failed to send {}: {}", reply, e);
                    }
                }
            }
        }

        Ok(accepted)
    }

    // Returns a cleaned line when `byte` terminates one
    fn push_byte(&mut self, byte: u8) -> Option<String> {
        if byte == b'\n' || byte == b'\r' {
            let overflowed = std::mem::replace(&mut self.overflowed, false);
            if overflowed || self.buffer.is_empty() {
                return None;
            }
            let line = clean_line(&self.buffer);
            self.buffer.clear();
            return Some(line);
        }

        if self.overflowed {
            return None;
        }
        if self.buffer.len() >= MAX_LINE_LEN {
            warn!("Command line exceeds {} bytes, discarding", MAX_LINE_LEN);
            self.buffer.clear();
            self.overflowed = true;
            return None;
        }
        self.buffer.push(byte);
        None
    }

    fn dispatch<A: MotorActuator>(
        &mut self,
        command: Command,
        drive: &mut DriveController<A>,
        now: Instant,
    ) -> Option<Reply> {
        debug!("Command: {:?}", command);
        self.last_accepted = now;

        match command {
            Command::Vel(velocity) => {
                drive.set_command(velocity);
                None
            }
            Command::Mode(Some(mode)) => {
                drive.set_mode(mode, now);
                Some(Reply::Mode(mode))
            }
            Command::Mode(None) => None,
            Command::Ping => Some(Reply::Pong),
        }
    }
}
