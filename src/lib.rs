//! Back-of-device gesture input.
//!
//! Raw pointer events are folded into finger traces by [`app::touch::TraceCapture`],
//! classified into decode payloads or menu directions, disambiguated through
//! [`app::menu::RadialMenu`] and shipped to a remote decoder through
//! [`app::net::DecodeClient`].

pub mod app;

pub use app::config::Config;
pub use app::menu::{MenuArity, RadialMenu};
pub use app::net::{DecodeClient, NetEvent};
pub use app::touch::TraceCapture;
pub use app::types::{
    CaptureEvent, CaptureMode, Direction, PointerAction, PointerEvent, PointerSample, TouchPoint,
};
