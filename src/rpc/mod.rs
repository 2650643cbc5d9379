mod feed;
mod mock;
mod rpc;
mod types;

pub use feed::EventFeed;
pub use mock::MockEventFeed;
pub use rpc::{RateLimitConfig, RpcClientConfig, RpcError, SorobanRpcClient};
pub use types::{EventFilter, EventsPage, EventsRequest, LatestLedger, Pagination, RawEvent};
