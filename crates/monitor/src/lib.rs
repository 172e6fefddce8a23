//! Detect-then-race core: polls redundant mempool endpoints for transactions
//! sent by a target address and, on first sighting, fans a pre-signed payload
//! out to every broadcast node.
//!
//! The API process embeds [`SniperSession`] directly; the `sniper-monitor`
//! binary runs the same session headless from environment configuration.

pub mod broadcaster;
pub mod cancel;
pub mod detector;
pub mod poller;
pub mod rate_limit;
pub mod rpc;
pub mod session;
pub mod worker;

#[cfg(test)]
mod testing;

pub use broadcaster::Broadcaster;
pub use cancel::{CancelSource, CancelToken};
pub use detector::{matching_tx_ids, SeenTransactions};
pub use poller::EndpointPoller;
pub use rate_limit::{Admission, TxRateLimiter};
pub use rpc::{HttpNodeClient, NodeClient, NodeClientError, SubmitResponse};
pub use session::{SessionError, SniperSession};
pub use worker::{build_session, run_monitor, MonitorError};
