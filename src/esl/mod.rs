//! FreeSWITCH event socket client: the call event source and fork command
//! sink for the controller.

pub mod client;
pub mod event;
pub mod frame;

pub use client::{EslCommander, EslConnection, check_reply, run_event_link};
pub use event::translate;
pub use frame::{EslFrame, parse_event_plain, read_frame};
