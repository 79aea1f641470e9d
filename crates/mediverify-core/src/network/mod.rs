mod session;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use session::{HttpSession, RetryPolicy, RETRY_STATUSES};
pub use transport::{
    ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError, TransportResult,
};
