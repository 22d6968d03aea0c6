use std::{path::PathBuf, sync::Arc, time::Instant};
use can_core::{error::SessionError, CanFrame, EventDirection, DEFAULT_INTERVAL_MS};
use canpanel_socketcan::{LinkControl, SocketFactory, SocketSession};
use crate::{command::Command, error::PanelError, scheduler::{interval_or_default, LoopScheduler}, settings::Settings};

/// Snapshot for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStatus {
    pub interface: String,
    pub link_up: bool,
    pub socket_open: bool,
    pub loop_enabled: bool,
    pub interval_ms: u32,
    pub loop_active: bool,
}

/// Ties the settings, the socket session and the loop scheduler together.
pub struct ControlPanel<F: SocketFactory, L: LinkControl> {
    settings: Settings,
    settings_path: Option<PathBuf>,
    link: Arc<L>,
    session: SocketSession<F, L>,
    scheduler: LoopScheduler,
    loop_enabled: bool,
    interval_ms: u32,
}

impl<F, L> ControlPanel<F, L>
where
    F: SocketFactory,
    L: LinkControl,
{
    pub fn new(settings: Settings, factory: F, link: Arc<L>) -> Self {
        Self {
            settings,
            settings_path: None,
            session: SocketSession::new(factory, Arc::clone(&link)),
            link,
            scheduler: LoopScheduler::new(),
            loop_enabled: false,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    /// Persist the settings to `path` whenever they are applied.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn session(&self) -> &SocketSession<F, L> {
        &self.session
    }

    #[inline]
    pub fn scheduler(&self) -> &LoopScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        log::debug!("CAN-PANEL - loop mode {}", if enabled { "on" } else { "off" });
        self.loop_enabled = enabled;
    }

    #[inline]
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Parse and store the loop interval, returning the value in effect.
    pub fn set_interval(&mut self, text: &str) -> u32 {
        self.interval_ms = interval_or_default(text);
        log::debug!("CAN-PANEL - loop interval {} ms", self.interval_ms);
        self.interval_ms
    }

    #[inline]
    pub fn link_is_up(&self) -> bool {
        self.link.is_up(self.settings.interface_name())
    }

    pub fn status(&self) -> PanelStatus {
        PanelStatus {
            interface: self.settings.interface_name().clone(),
            link_up: self.link_is_up(),
            socket_open: self.session.is_open(),
            loop_enabled: self.loop_enabled,
            interval_ms: self.interval_ms,
            loop_active: self.scheduler.is_active(),
        }
    }

    pub fn open(&self) -> Result<(), PanelError> {
        self.session.open(self.settings.interface_name())?;
        Ok(())
    }

    #[inline]
    pub fn close(&self) {
        self.session.close();
    }

    /// Handle one button press.
    pub fn press(&mut self, command: Command, now: Instant) -> Result<(), PanelError> {
        let payload = self.settings.payload(command).to_vec();
        log::debug!("CAN-PANEL - {} pressed", command);

        match command {
            Command::Stop => {
                let sent = self.send_frame(&payload, true);
                if self.scheduler.stop() {
                    self.session.listeners().text_event(EventDirection::Sys, "Loop stopped");
                }
                sent
            },
            c if c.is_repeatable() && self.loop_enabled => {
                self.ensure_open()?;
                self.scheduler.start(&self.session, self.settings.can_id(), payload, self.interval_ms, now)?;
                Ok(())
            },
            _ => self.send_frame(&payload, true),
        }
    }

    /// Send `payload` on the configured identifier, opening the session first
    /// when `force_open` is set.
    pub fn send_frame(&self, payload: &[u8], force_open: bool) -> Result<(), PanelError> {
        if force_open {
            self.ensure_open()?;
        }

        self.session.send(self.settings.can_id(), payload)?;
        Ok(())
    }

    /// Bring the interface down (closing the socket) when up, or up when down.
    /// Returns the link state afterwards.
    pub fn toggle_link(&mut self) -> Result<bool, PanelError> {
        let iface = self.settings.interface_name().clone();
        let result = if self.link.is_up(&iface) {
            self.link.set_down(&iface)
                .map(|_| self.session.close())
        }
        else {
            self.link.set_up(&iface)
        };

        if let Err(e) = &result {
            log::warn!("CAN-PANEL - toggle {} failed: {}", iface, e);
            self.session.listeners()
                .text_event(EventDirection::Sys, "Failed to toggle interface (sudo may require password).");
        }
        result?;

        let up = self.link.is_up(&iface);
        log::info!("CAN-PANEL - interface {} is {}", iface, if up { "UP" } else { "DOWN" });
        Ok(up)
    }

    /// Replace the settings and reconfigure the interface bitrate.
    ///
    /// The new settings are kept and persisted even when the interface
    /// commands fail; the first failure is returned.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<(), PanelError> {
        let iface = settings.interface_name().clone();
        let bitrate = settings.bitrate();

        if let Some(current) = self.session.interface() {
            if current != iface {
                log::info!("CAN-PANEL - interface changed from {} to {}", current, iface);
                self.session.close();
            }
        }

        let down = self.link.set_down(&iface);
        let rate = self.link.set_bitrate(&iface, bitrate);
        let up = self.link.set_up(&iface);

        self.settings = settings;
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save(path) {
                log::warn!("CAN-PANEL - {}", e);
            }
        }

        let listeners = self.session.listeners();
        match down.and(rate).and(up) {
            Ok(()) => {
                log::info!("CAN-PANEL - {} bitrate set to {}", iface, bitrate);
                listeners.text_event(EventDirection::Sys, &format!("Bitrate set to {}", bitrate));
                Ok(())
            },
            Err(e) => {
                log::warn!("CAN-PANEL - bitrate change on {} failed: {}", iface, e);
                listeners.text_event(EventDirection::Sys, "Failed to set bitrate via system commands (sudo may be required).");
                Err(e.into())
            },
        }
    }

    /// Fire the loop tick if due. Failures are reported, never fatal.
    pub fn tick(&mut self, now: Instant) -> Option<Result<(), SessionError>> {
        let result = self.scheduler.poll(&self.session, now);
        if let Some(Err(e)) = &result {
            log::warn!("CAN-PANEL - loop send failed: {}", e);
        }

        result
    }

    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    #[inline]
    pub fn on_readable(&self) -> Option<CanFrame> {
        self.session.on_readable()
    }

    fn ensure_open(&self) -> Result<(), PanelError> {
        if !self.session.is_open() {
            self.open()?;
        }

        Ok(())
    }
}
