use std::{process::{Command, Output, Stdio}, thread, time::{Duration, Instant}};
use can_core::error::ControlError;

/// Query timeout of `ip link show`.
pub const LINK_QUERY_TIMEOUT: Duration = Duration::from_millis(1000);
const POLL_STEP: Duration = Duration::from_millis(10);

/// Administrative state of a network interface.
pub trait LinkControl: Send + Sync {
    /// Whether the link is administratively up. Any failure counts as down.
    fn is_up(&self, name: &str) -> bool;
    fn set_up(&self, name: &str) -> Result<(), ControlError>;
    fn set_down(&self, name: &str) -> Result<(), ControlError>;
    /// Only meaningful while the link is down.
    fn set_bitrate(&self, name: &str, bitrate: u32) -> Result<(), ControlError>;
}

/// [`LinkControl`] through the iproute2 `ip` tool.
///
/// Queries run unprivileged, changes run behind `sudo` by default.
#[derive(Debug, Clone)]
pub struct IpLink {
    query: String,
    privileged: Vec<String>,
    timeout: Duration,
}

impl Default for IpLink {
    fn default() -> Self {
        Self {
            query: "ip".into(),
            privileged: vec!["sudo".into(), "ip".into()],
            timeout: LINK_QUERY_TIMEOUT,
        }
    }
}

impl IpLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program used for `link show`.
    pub fn with_query<S: Into<String>>(mut self, program: S) -> Self {
        self.query = program.into();
        self
    }

    /// Program and leading arguments used for `link set`, e.g. `["sudo", "ip"]`.
    pub fn with_privileged<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privileged = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn link_set(&self, args: &[&str]) -> Result<(), ControlError> {
        let (program, prefix) = self.privileged
            .split_first()
            .ok_or_else(|| ControlError::SpawnFailed("empty privileged command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(prefix).arg("link").arg("set").args(args);
        log::debug!("CAN-PANEL - running {:?}", cmd);

        let status = cmd.status()
            .map_err(|e| ControlError::SpawnFailed(format!("{}: {}", program, e)))?;
        if status.success() {
            Ok(())
        }
        else {
            let code = status.code().unwrap_or(-1);
            log::warn!("CAN-PANEL - {:?} exited with code: {}", cmd, code);
            Err(ControlError::CommandFailed(code))
        }
    }
}

impl LinkControl for IpLink {
    fn is_up(&self, name: &str) -> bool {
        let mut cmd = Command::new(&self.query);
        cmd.args(["link", "show", name]);

        match run_with_timeout(&mut cmd, self.timeout) {
            Ok(output) if output.status.success() => {
                link_output_is_up(&String::from_utf8_lossy(&output.stdout))
            },
            Ok(output) => {
                log::debug!("CAN-PANEL - link query of {} exited with {}", name, output.status);
                false
            },
            Err(e) => {
                log::warn!("CAN-PANEL - link query of {} failed: {}", name, e);
                false
            },
        }
    }

    #[inline]
    fn set_up(&self, name: &str) -> Result<(), ControlError> {
        self.link_set(&[name, "up"])
    }

    #[inline]
    fn set_down(&self, name: &str) -> Result<(), ControlError> {
        self.link_set(&[name, "down"])
    }

    fn set_bitrate(&self, name: &str, bitrate: u32) -> Result<(), ControlError> {
        let bitrate = bitrate.to_string();
        self.link_set(&[name, "type", "can", "bitrate", &bitrate])
    }
}

/// Run a command to completion, killing it once `timeout` elapsed.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, ControlError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ControlError::SpawnFailed(e.to_string()))?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    if let Err(e) = child.kill() {
                        log::warn!("CAN-PANEL - error {} when killing timed out command", e);
                    }
                    let _ = child.wait();
                    return Err(ControlError::Timeout(timeout.as_millis() as u64));
                }
                thread::sleep(POLL_STEP);
            },
            Err(e) => return Err(ControlError::SpawnFailed(e.to_string())),
        }
    }

    child.wait_with_output()
        .map_err(|e| ControlError::SpawnFailed(e.to_string()))
}

/// Interpret `ip link show` output: the flag list `<...>` holds `UP`, or the
/// operational state reads `state UP`.
pub fn link_output_is_up(output: &str) -> bool {
    let flags_up = output.find('<')
        .and_then(|start| {
            let rest = &output[start + 1..];
            rest.find('>').map(|end| &rest[..end])
        })
        .map(|flags| flags.split(',').any(|f| f.trim() == "UP"))
        .unwrap_or_default();

    flags_up || output.contains("state UP")
}
