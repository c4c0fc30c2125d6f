//! Rate limit service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{error, info, instrument};

use super::proto::gatekeeper::v1::{
    rate_limit_service_server::RateLimitService, CheckRateLimitRequest, CheckRateLimitResponse,
};

use crate::ratelimit::RateLimiter;

/// Implementation of the gatekeeper.v1.RateLimitService gRPC interface.
pub struct RateLimitServiceImpl {
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
}

impl RateLimitServiceImpl {
    /// Create a new RateLimitServiceImpl with the given rate limiter.
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self { rate_limiter }
    }
}

#[tonic::async_trait]
impl RateLimitService for RateLimitServiceImpl {
    /// Determine whether the request identified by (client, policy) is
    /// allowed to proceed.
    ///
    /// The engine leaves the store-failure fallback to the transport; this
    /// implementation fails closed, answering `allowed = false` when the
    /// store cannot be reached.
    #[instrument(
        skip(self, request),
        fields(
            policy = %request.get_ref().policy,
            client_id = %request.get_ref().client_id
        )
    )]
    async fn check_rate_limit(
        &self,
        request: Request<CheckRateLimitRequest>,
    ) -> Result<Response<CheckRateLimitResponse>, Status> {
        let req = request.into_inner();

        info!(
            policy = %req.policy,
            client_id = %req.client_id,
            "Received rate limit check request"
        );

        let allowed = match self.rate_limiter.check(&req.client_id, &req.policy).await {
            Ok(allowed) => allowed,
            Err(e) => {
                // Fail closed: a store outage must not open the gate
                error!(error = %e, policy = %req.policy, "Rate limit check failed, denying");
                false
            }
        };

        info!(allowed = allowed, "Rate limit check result");

        Ok(Response::new(CheckRateLimitResponse {
            allowed,
            message: format!("{}:{}", req.policy, req.client_id),
        }))
    }
}
