//! Fetch adapter

use super::{blocked_body, blocked_reason, GuardContext, BLOCKED_STATUS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use syar_network::{Fetch, FetchFuture, FetchRequest, HttpError, Primitive, Response};

/// How a blocked fetch is reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchBlockMode {
    /// The future rejects with [`HttpError::Blocked`]
    #[default]
    Reject,
    /// The future resolves to a synthetic 403 with a JSON body
    Resolve,
}

/// Fetch primitive that refuses blocked targets
pub struct GuardedFetch {
    inner: Arc<dyn Fetch>,
    ctx: GuardContext,
    mode: FetchBlockMode,
}

impl GuardedFetch {
    pub fn new(inner: Arc<dyn Fetch>, ctx: GuardContext, mode: FetchBlockMode) -> Self {
        Self { inner, ctx, mode }
    }

    pub fn mode(&self) -> FetchBlockMode {
        self.mode
    }
}

impl Fetch for GuardedFetch {
    fn fetch(&self, request: FetchRequest) -> FetchFuture {
        let decision = self.ctx.check(Primitive::Fetch, &request);
        if decision.is_allowed() {
            return self.inner.fetch(request);
        }

        let result = match self.mode {
            FetchBlockMode::Reject => Err(HttpError::Blocked(blocked_reason(&decision))),
            FetchBlockMode::Resolve => Ok(Response::synthetic(
                BLOCKED_STATUS,
                "application/json",
                blocked_body(&request.url, &decision),
                &request.url,
            )),
        };
        Box::pin(std::future::ready(result))
    }
}
