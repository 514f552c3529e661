//! JSON-RPC bindings for the wave portal: a node-backed wallet and the
//! contract itself.

mod portal;
mod transport;
mod wallet;

pub use portal::WavePortalRpc;
pub use transport::{DEFAULT_RPC_URL, RpcTransport};
pub use wallet::RpcWallet;
