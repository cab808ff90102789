use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{debug, warn};

use crate::controller::{Completion, Outbound};
use crate::gateway::{Gateway, GatewayError};

/// Runs each outbound request on its own worker thread and hands the
/// completions back to whoever owns the dashboard.
pub struct Executor {
	gateway: Arc<dyn Gateway>,
	sender: Sender<Completion>,
	receiver: Receiver<Completion>,
}

impl Executor {
	pub fn new(gateway: Arc<dyn Gateway>) -> Self {
		let (sender, receiver) = mpsc::channel();
		Self {
			gateway,
			sender,
			receiver,
		}
	}

	pub fn submit(&self, outbound: Outbound) {
		let gateway = Arc::clone(&self.gateway);
		let sender = self.sender.clone();
		let ticket = outbound.ticket;

		let spawned = thread::Builder::new()
			.name(format!("request-{ticket}"))
			.spawn(move || {
				let result = gateway.send(&outbound.call);
				if sender.send(Completion { ticket, result }).is_err() {
					debug!(ticket, "dashboard went away before the request finished");
				}
			});

		if let Err(err) = spawned {
			warn!(ticket, error = %err, "failed to spawn request worker");
			let completion = Completion {
				ticket,
				result: Err(GatewayError::Transport(format!("failed to start request: {err}"))),
			};
			let _ = self.sender.send(completion);
		}
	}

	pub fn submit_all(&self, outbound: Vec<Outbound>) {
		for request in outbound {
			self.submit(request);
		}
	}

	/// Completions that have arrived so far, without blocking.
	pub fn drain(&self) -> Vec<Completion> {
		self.receiver.try_iter().collect()
	}

	#[cfg(test)]
	fn wait(&self, timeout: std::time::Duration) -> Option<Completion> {
		self.receiver.recv_timeout(timeout).ok()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	use serde_json::{Value, json};

	use crate::controller::Outbound;
	use crate::domain::Range;
	use crate::gateway::{ApiCall, Gateway, GatewayError};

	use super::Executor;

	#[derive(Default)]
	struct RecordingGateway {
		calls: Mutex<Vec<ApiCall>>,
	}

	impl Gateway for RecordingGateway {
		fn send(&self, call: &ApiCall) -> Result<Value, GatewayError> {
			self.calls.lock().expect("calls lock").push(call.clone());
			match call {
				ApiCall::StopTask => Err(GatewayError::Transport("connection refused".to_string())),
				_ => Ok(json!({ "status": "success", "path": call.path() })),
			}
		}
	}

	#[test]
	fn delivers_every_completion_with_its_ticket() {
		let gateway = Arc::new(RecordingGateway::default());
		let executor = Executor::new(gateway.clone());

		executor.submit_all(vec![
			Outbound {
				ticket: 1,
				call: ApiCall::GetStats { range: Range::Month },
			},
			Outbound {
				ticket: 2,
				call: ApiCall::StopTask,
			},
		]);

		let mut completions = (0..2)
			.map(|_| executor.wait(Duration::from_secs(5)).expect("completion should arrive"))
			.collect::<Vec<_>>();
		completions.sort_by_key(|completion| completion.ticket);

		let stats = completions[0].result.as_ref().expect("stats call succeeds");
		assert_eq!(stats["path"], "/get_stats?range=month");
		assert_eq!(
			completions[1].result,
			Err(GatewayError::Transport("connection refused".to_string()))
		);
		assert_eq!(gateway.calls.lock().expect("calls lock").len(), 2);
		assert!(executor.drain().is_empty());
	}
}
