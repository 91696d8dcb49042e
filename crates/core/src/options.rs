use std::time::Duration;

/// Knobs passed from the root actor down to every tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
	/// Upper bound on items or properties fetched for one preview.
	pub preview_max_items: usize,
	/// Timeout for a single target request.
	pub request_timeout: Duration,
}

impl Default for BridgeOptions {
	fn default() -> Self {
		Self {
			preview_max_items: 10,
			request_timeout: Duration::from_secs(30),
		}
	}
}
