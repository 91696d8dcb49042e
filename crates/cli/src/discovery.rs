//! Target discovery over the target's HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bridge::TabSource;
use bridge_protocol::target::TargetDescriptor;
use bridge_runtime::{Error, Result};

/// Lists targets with `GET <base>/json`.
#[derive(Debug, Clone)]
pub struct HttpTabSource {
	client: reqwest::Client,
	base: String,
}

impl HttpTabSource {
	pub fn new(base: impl Into<String>) -> Self {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.unwrap_or_default();
		Self {
			client,
			base: base.into().trim_end_matches('/').to_string(),
		}
	}

	pub fn listing_url(&self) -> String {
		format!("{}/json", self.base)
	}
}

#[async_trait]
impl TabSource for HttpTabSource {
	async fn list(&self) -> Result<Vec<TargetDescriptor>> {
		let url = self.listing_url();
		tracing::debug!(target = "bridge", %url, "listing targets");
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		let targets: Vec<TargetDescriptor> = response
			.json()
			.await
			.map_err(|e| Error::ProtocolError(format!("{url}: {e}")))?;
		Ok(targets.into_iter().filter(|target| target.kind == "page").collect())
	}
}
