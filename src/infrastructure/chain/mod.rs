//! Chain access - ABI handling, contract clients, confirmation polling

pub mod abi;
pub mod listener;
pub mod protocol_client;

pub use abi::{load_abi, parse_abi};
pub use listener::TxListener;
pub use protocol_client::{DecodedCall, ProtocolClient};
