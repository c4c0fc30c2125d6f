//! gRPC server module for the rate limit decision service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod gatekeeper {
        pub mod v1 {
            tonic::include_proto!("gatekeeper.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::gatekeeper::v1::{
    rate_limit_service_server::RateLimitServiceServer, CheckRateLimitRequest,
    CheckRateLimitResponse,
};
