//! File transfer protocol
//!
//! Every packet is a 15 byte header followed by a JSON metadata record and
//! an opaque payload:
//!
//! ```text
//! +--------+--------+--------------+--------------+----------+---------+
//! | 0xCAFE | opcode | metadata len | payload len  | metadata | payload |
//! | u16 BE | u8     | u32 BE       | u64 BE       | JSON     | bytes   |
//! +--------+--------+--------------+--------------+----------+---------+
//! ```
//!
//! The codec and the buffering are sans-IO: `FrameDecoder` turns arbitrary
//! read chunks into packets, `OutboundQueue` turns packets into bytes for
//! whatever the socket accepts. The `server` and `client` handlers give the
//! packets meaning.
//!
//! # Example Usage
//!
//! ```ignore
//! use dropr::protocol::{FrameDecoder, Metadata, Opcode, Packet};
//!
//! let request = Packet::from_metadata(&Metadata::for_file(Opcode::Download, "a.txt"), vec![])?;
//! let mut decoder = FrameDecoder::new();
//! let mut packets = Vec::new();
//! decoder.push(&request.encode()?, &mut packets)?;
//! assert_eq!(packets[0], request);
//! ```

pub mod client;
pub mod error;
pub mod framing;
pub mod metadata;
pub mod outbound;
pub mod server;
pub mod traits;
pub mod wire;

// Re-export public API
pub use client::{ClientEvent, ReplyDispatcher};
pub use error::ProtocolError;
pub use framing::{FrameDecoder, FrameLimits, Stage};
pub use metadata::{Metadata, Status};
pub use outbound::{DrainStatus, OutboundQueue};
pub use server::RequestDispatcher;
pub use traits::PacketHandler;
pub use wire::{Header, Opcode, Packet, HEADER_SIZE, MAGIC};

// vim: ts=4
