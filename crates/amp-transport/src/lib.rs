//! # amp-transport
//!
//! 配布サーバーとクライアントの間のバイナリプロトコル。
//!
//! ## 接続の流れ
//!
//! ```text
//! client                                   server
//!   │── ClientHello  "AMMH" ver comp ───────►│
//!   │◄─ ServerHello  "AMOK" ver comp tls ────│
//!   │   (tls = 1 ならここから TLS)            │
//!   │── frame(ProtocolMessage) ─────────────►│  credential を毎回検証
//!   │◄─ frame(FileResponse) ─────────────────│
//!   │◄─ frame(Chunk) ...  ───────────────────│
//!   │◄─ frame(EndOfTransmission) ────────────│
//! ```
//!
//! ## フレーム
//!
//! ```text
//! [compressed_len: u32 BE][original_len: u32 BE][compressed bytes]
//! ```

pub mod chunk;
pub mod compression;
pub mod error;
pub mod frame;
pub mod message;
pub mod preamble;

pub use chunk::{check_chunk_size, ChunkReader, FileAssembly, CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use compression::{CodecRegistry, CompressionCodec, NoneCompression, COMPRESSION_NONE};
pub use error::{TransportError, TransportResult};
pub use frame::{decode_frame, encode_frame, read_frame, write_frame, MAX_FRAME_SIZE};
pub use message::{ErrorCode, MessageBody, ProtocolMessage, ServerMessage};
pub use preamble::{is_distribution_preamble, ClientHello, ServerHello};

/// 配布プロトコルのバージョン
pub const PROTOCOL_VERSION: u8 = 1;
