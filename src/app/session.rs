//! Session controller: turns capture events and decode results into text
//! edits, menu rounds and protocol traffic.
//!
//! Word entry runs in rounds. A finished gesture is sent for decoding; the
//! top candidate is typed provisionally and the rest open the radial menu.
//! Confirming replaces the provisional word and notifies the service. Undo
//! removes it, notifies the service and bans the rejected candidates from the
//! next decode of the same word, which then opens the wider menu.

use crossbeam_channel::{select, Receiver};

use crate::app::{
    config::{SessionConfig, StaleReplyPolicy},
    menu::{MenuArity, RadialMenu},
    net::{DecodeClient, DecodeRequest, DecodeTask, Endpoint, NetEvent, ProtocolMessage},
    text,
    touch::{liveness::GestureStopSignal, TraceCapture},
    types::{CandidateList, CaptureEvent, CaptureMode, PointerEvent},
};

/// What the session needs from the decode service.
pub trait DecodeTransport {
    /// Starts a decode and returns its sequence number.
    fn request_decode(&self, request: DecodeRequest) -> u64;
    /// Best-effort notification.
    fn notify(&self, message: ProtocolMessage);
}

impl DecodeTransport for DecodeClient {
    fn request_decode(&self, request: DecodeRequest) -> u64 {
        DecodeClient::request_decode(self, request)
    }

    fn notify(&self, message: ProtocolMessage) {
        DecodeClient::notify(self, message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    DecodeRequested { seq: u64 },
    MenuOpened { arity: MenuArity, words: Vec<String> },
    Highlighted { slot: Option<usize> },
    Committed { word: String },
    Undone { banned_words: Vec<String> },
    NoCandidates { seq: u64 },
    DecodeFailed { seq: u64, reason: String },
    ServerFound(Endpoint),
    ServerUnreachable { reason: String },
    GestureStopped,
}

pub struct Session<T> {
    config: SessionConfig,
    transport: T,
    menu: RadialMenu,
    text: String,
    /// Candidates shown in the current word's last round.
    shown: Vec<String>,
    latest_seq: Option<u64>,
}

impl<T: DecodeTransport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            menu: RadialMenu::new(),
            text: String::new(),
            shown: Vec::new(),
            latest_seq: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn menu(&self) -> &RadialMenu {
        &self.menu
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Capture mode the touch surface should be in.
    pub fn capture_mode(&self) -> CaptureMode {
        if self.menu.is_open() {
            CaptureMode::Selection
        } else {
            CaptureMode::Gesture
        }
    }

    pub fn on_capture_event(&mut self, event: CaptureEvent) -> Option<SessionUpdate> {
        match event {
            CaptureEvent::GestureStarted => None,
            CaptureEvent::GestureStopped => Some(SessionUpdate::GestureStopped),
            CaptureEvent::GestureFinished { points } => {
                if points.len() < 2 || self.menu.is_open() {
                    return None;
                }
                let task = if self.config.command_mode {
                    DecodeTask::CmdDecode
                } else {
                    DecodeTask::Decode
                };
                let request = DecodeRequest {
                    task,
                    points,
                    prev_word: text::prev_word(&self.text),
                    prev_text: text::prev_text(&self.text),
                    banned_words: self.shown.clone(),
                    reply_port: 0,
                };
                let seq = self.transport.request_decode(request);
                log::info!("session: decode_requested seq={seq}");
                self.latest_seq = Some(seq);
                Some(SessionUpdate::DecodeRequested { seq })
            }
            CaptureEvent::DirectionHeard(direction) => {
                if !self.menu.is_open() {
                    return None;
                }
                let slot = self.menu.highlight(direction);
                log::debug!(
                    "session: highlighted slot={slot:?} arity={:?}",
                    self.menu.arity()
                );
                Some(SessionUpdate::Highlighted { slot })
            }
            CaptureEvent::DirectionConfirmed(direction) => match self.menu.confirm(direction) {
                Ok(Some(word)) => Some(self.commit(word)),
                Ok(None) => None,
                Err(err) => {
                    log::debug!("session: confirm_ignored reason={err}");
                    None
                }
            },
        }
    }

    pub fn on_net_event(&mut self, event: NetEvent) -> Option<SessionUpdate> {
        match event {
            NetEvent::ServerFound(endpoint) => Some(SessionUpdate::ServerFound(endpoint)),
            NetEvent::ServerUnreachable(err) => Some(SessionUpdate::ServerUnreachable {
                reason: err.to_string(),
            }),
            NetEvent::Decoded { seq, candidates } => {
                if self.is_stale(seq) {
                    return None;
                }
                self.show(seq, &candidates)
            }
            NetEvent::DecodeFailed { seq, error } => {
                if self.is_stale(seq) {
                    return None;
                }
                Some(SessionUpdate::DecodeFailed {
                    seq,
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Rejects the provisional word and the candidates shown with it.
    pub fn undo(&mut self) -> Option<SessionUpdate> {
        self.menu.cancel();
        self.text = text::replace_last_word(&self.text, "");
        let banned_words = self.shown.clone();
        log::info!("session: undo banned={}", banned_words.len());
        self.transport.notify(ProtocolMessage::Undo {
            banned_words: banned_words.clone(),
        });
        Some(SessionUpdate::Undone { banned_words })
    }

    fn is_stale(&self, seq: u64) -> bool {
        let stale = self.config.stale_replies == StaleReplyPolicy::Drop
            && self.latest_seq != Some(seq);
        if stale {
            log::warn!(
                "session: stale_reply_dropped seq={seq} latest={:?}",
                self.latest_seq
            );
        }
        stale
    }

    fn show(&mut self, seq: u64, candidates: &CandidateList) -> Option<SessionUpdate> {
        let Some(top) = candidates.top() else {
            log::info!("session: no_candidates seq={seq}");
            return Some(SessionUpdate::NoCandidates { seq });
        };
        let arity = if self.shown.is_empty() {
            MenuArity::Four
        } else {
            MenuArity::Six
        };
        self.shown = candidates
            .truncated(arity.capacity())
            .words()
            .map(str::to_string)
            .collect();
        self.text = text::append_word(&self.text, &top.word);

        if self.config.auto_accept_single && candidates.len() == 1 {
            let word = top.word.clone();
            return Some(self.commit(word));
        }
        if let Err(err) = self.menu.open(arity, candidates) {
            log::warn!("session: menu_open_failed err={err}");
            return None;
        }
        Some(SessionUpdate::MenuOpened {
            arity,
            words: self.shown.clone(),
        })
    }

    fn commit(&mut self, word: String) -> SessionUpdate {
        self.text = text::replace_last_word(&self.text, &word);
        log::info!("session: committed word={word}");
        self.transport.notify(ProtocolMessage::Confirm { word: word.clone() });
        self.shown.clear();
        SessionUpdate::Committed { word }
    }
}

/// Inputs of the interaction thread besides the touch surface's own signals.
#[derive(Clone, Debug)]
pub enum InputEvent {
    Pointer(PointerEvent),
    /// Hardware undo key.
    Undo,
}

/// Runs the interaction thread until `input` disconnects.
///
/// Pointer events, stop signals and network results are processed strictly
/// one at a time, and the capture mode follows the menu after every step.
pub fn run_interaction_loop<T, F>(
    capture: &mut TraceCapture,
    session: &mut Session<T>,
    input: &Receiver<InputEvent>,
    stops: &Receiver<GestureStopSignal>,
    net: &Receiver<NetEvent>,
    mut on_update: F,
) where
    T: DecodeTransport,
    F: FnMut(&SessionUpdate),
{
    let mut stops = stops.clone();
    let mut net = net.clone();
    let mut updates = Vec::new();
    loop {
        let mut stops_closed = false;
        let mut net_closed = false;
        select! {
            recv(input) -> msg => match msg {
                Ok(InputEvent::Pointer(event)) => {
                    for captured in capture.handle(&event).into_events() {
                        updates.extend(session.on_capture_event(captured));
                    }
                }
                Ok(InputEvent::Undo) => updates.extend(session.undo()),
                Err(_) => {
                    log::info!("session: input_closed");
                    return;
                }
            },
            recv(stops) -> msg => match msg {
                Ok(signal) => {
                    if let Some(stopped) = capture.on_stop_signal(signal) {
                        updates.extend(session.on_capture_event(stopped));
                    }
                }
                Err(_) => stops_closed = true,
            },
            recv(net) -> msg => match msg {
                Ok(event) => updates.extend(session.on_net_event(event)),
                Err(_) => net_closed = true,
            },
        }
        // A closed channel stays ready forever; stop selecting on it.
        if stops_closed {
            stops = crossbeam_channel::never();
        }
        if net_closed {
            net = crossbeam_channel::never();
        }
        capture.set_mode(session.capture_mode());
        for update in updates.drain(..) {
            on_update(&update);
        }
    }
}
