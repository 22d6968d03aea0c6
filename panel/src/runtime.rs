use std::{io::{Read, Write}, os::fd::{AsFd, BorrowedFd}, str::FromStr, time::Instant};
use nix::{errno::Errno, poll::{poll, PollFd, PollFlags}};
use canpanel_socketcan::{LinkControl, SocketFactory};
use crate::{command::Command, error::PanelError, panel::ControlPanel};

const INPUT_CHUNK: usize = 8192;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Press(Command),
    Connect,
    Open,
    Close,
    Loop(bool),
    Interval(String),
    Bitrate(u32),
    Status,
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<&str> = words.collect();

        match (head.as_str(), rest.as_slice()) {
            ("connect" | "toggle", []) => Ok(Self::Connect),
            ("open", []) => Ok(Self::Open),
            ("close", []) => Ok(Self::Close),
            ("loop", [v]) => match v.to_ascii_lowercase().as_str() {
                "on" | "1" | "true" => Ok(Self::Loop(true)),
                "off" | "0" | "false" => Ok(Self::Loop(false)),
                _ => Err(format!("expected `loop on|off`, got `{}`", s.trim())),
            },
            ("interval", [v]) => Ok(Self::Interval(v.to_string())),
            ("bitrate", [v]) => v.parse()
                .map(Self::Bitrate)
                .map_err(|_| format!("invalid bitrate `{}`", v)),
            ("status", []) => Ok(Self::Status),
            ("quit" | "exit" | "q", []) => Ok(Self::Quit),
            (command, []) => Command::from_str(command).map(Self::Press),
            _ => Err(format!("unknown input `{}`", s.trim())),
        }
    }
}

/// Drive the panel until `quit` or end of input.
///
/// Waits on the input, the session socket while open and the loop deadline.
/// Command failures are reported to `out` and the loop carries on.
pub fn run<F, L, R, W>(panel: &mut ControlPanel<F, L>, mut input: R, out: &mut W) -> Result<(), PanelError>
where
    F: SocketFactory,
    L: LinkControl,
    R: Read + AsFd,
    W: Write,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; INPUT_CHUNK];

    loop {
        let timeout = poll_timeout(panel.next_deadline(), Instant::now());
        let socket_fd = panel.session().readable_fd();

        let (input_ready, socket_ready) = {
            let mut fds = vec![PollFd::new(input.as_fd(), PollFlags::POLLIN)];
            if let Some(fd) = socket_fd {
                let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
                fds.push(PollFd::new(borrowed_fd, PollFlags::POLLIN));
            }

            match poll::<u16>(&mut fds, timeout) {
                Ok(_) => {},
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PanelError::Io(format!("poll failed: {}", e))),
            }

            (is_ready(&fds[0]), fds.get(1).map_or(false, is_ready))
        };

        if socket_ready {
            panel.on_readable();
        }

        if input_ready {
            let read = match input.read(&mut chunk) {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PanelError::Io(format!("input read failed: {}", e))),
            };

            if read == 0 {
                let last = String::from_utf8_lossy(&pending).into_owned();
                handle_line(panel, &last, out)?;
                log::debug!("CAN-PANEL - end of input");
                return Ok(());
            }

            pending.extend_from_slice(&chunk[..read]);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if !handle_line(panel, &String::from_utf8_lossy(&line), out)? {
                    return Ok(());
                }
            }
        }

        panel.tick(Instant::now());
    }
}

/// Execute one input line. Returns `false` on quit.
pub fn handle_line<F, L, W>(panel: &mut ControlPanel<F, L>, line: &str, out: &mut W) -> Result<bool, PanelError>
where
    F: SocketFactory,
    L: LinkControl,
    W: Write,
{
    let line = line.trim();
    if line.is_empty() {
        return Ok(true);
    }

    let input = match Input::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            write_out(out, &format!("error: {}", e))?;
            return Ok(true);
        },
    };
    log::trace!("CAN-PANEL - input {:?}", input);

    let result = match input {
        Input::Quit => return Ok(false),
        Input::Press(command) => panel.press(command, Instant::now()),
        Input::Connect => panel.toggle_link()
            .and_then(|up| write_out(out, &format!("link {}", if up { "UP" } else { "DOWN" }))),
        Input::Open => panel.open(),
        Input::Close => {
            panel.close();
            Ok(())
        },
        Input::Loop(enabled) => {
            panel.set_loop_enabled(enabled);
            Ok(())
        },
        Input::Interval(text) => {
            let ms = panel.set_interval(&text);
            write_out(out, &format!("interval {} ms", ms))
        },
        Input::Bitrate(bitrate) => {
            let mut settings = panel.settings().clone();
            settings.set_bitrate(bitrate);
            panel.apply_settings(settings)
        },
        Input::Status => {
            let status = panel.status();
            write_out(out, &format!(
                "interface {} {}, socket {}, loop {} ({} ms{})",
                status.interface,
                if status.link_up { "UP" } else { "DOWN" },
                if status.socket_open { "open" } else { "closed" },
                if status.loop_enabled { "on" } else { "off" },
                status.interval_ms,
                if status.loop_active { ", running" } else { "" },
            ))
        },
    };

    match result {
        Ok(()) => Ok(true),
        Err(PanelError::Io(e)) => Err(PanelError::Io(e)),
        Err(e) => {
            write_out(out, &format!("error: {}", e))?;
            Ok(true)
        },
    }
}

fn write_out<W: Write>(out: &mut W, line: &str) -> Result<(), PanelError> {
    writeln!(out, "{}", line)
        .and_then(|_| out.flush())
        .map_err(|e| PanelError::Io(format!("output write failed: {}", e)))
}

fn is_ready(fd: &PollFd) -> bool {
    fd.revents()
        .map_or(false, |r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR))
}

/// Milliseconds until `deadline`, rounded up. Without a deadline the wait is
/// capped and the loop simply polls again.
fn poll_timeout(deadline: Option<Instant>, now: Instant) -> u16 {
    match deadline {
        Some(deadline) => {
            let wait = deadline.saturating_duration_since(now);
            let ms = (wait.as_micros() + 999) / 1000;
            ms.min(u16::MAX as u128) as u16
        },
        None => u16::MAX,
    }
}
