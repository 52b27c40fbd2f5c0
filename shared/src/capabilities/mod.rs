//! Shell-facing capabilities. HTTP, key-value storage and render come from
//! the Crux crates; the timer and history capabilities are defined here.

pub mod history;
pub mod http;
pub mod kv;
pub mod timer;

pub use self::history::{History, HistoryOperation};
pub use self::http::{HttpError, SessionEndpoint, SessionRequest, ValidatedUrl};
pub use self::kv::{KeyNamespace, KvError, KvKey};
pub use self::timer::{Timer, TimerOperation};

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub render: Render<Event>,
    pub timer: Timer<Event>,
    pub history: History<Event>,
}
