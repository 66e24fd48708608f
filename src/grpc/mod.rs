// Dynamic gRPC plumbing: compiled descriptors, per-service channels, and
// the dispatcher that turns method names into live calls.

pub mod channel;
pub mod client;
pub mod descriptors;
pub mod response;
pub mod tls;

pub use channel::ChannelPool;
pub use client::{ClientPool, RpcClient};
pub use descriptors::DescriptorStore;
pub use response::{GrpcResponse, StatusInfo, StreamEvent};
