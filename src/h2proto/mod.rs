//! A compact HTTP/2 frame engine: handshake driver, byte-level codec, and
//! the small set of operations the connection engine and stream need
//! (`feed`, `send_headers`, `send_data`, `end_stream`, `increment_window`,
//! `acknowledge_received_data`, `get_next_stream_id`, `local_flow_window`,
//! `max_outbound_frame_size`, `data_to_send`).
//!
//! This module stands in for what a production client would get from an
//! external HTTP/2 implementation; it is deliberately minimal (no
//! priority tree, no Huffman/dynamic-table HPACK, no push) since none of
//! that is in scope for the connection engine or stream built on top.

mod codec;
mod event;
mod frame;
mod hpack;
mod settings;

pub use codec::Codec;
pub use event::Event;
pub use frame::{Reason, StreamId, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE};
pub use settings::SettingCode;
