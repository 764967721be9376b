use thiserror::Error;
use tokio::sync::mpsc;
use tradelens_models::{
    ClassifiedError, ErrorKind, ForecastOutcome, ForecastRequest, ForecastResponse,
};
use uuid::Uuid;

use crate::engine::ForecastEngine;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("forecast worker has stopped")]
    Closed,
}

/// Submits owned requests to the worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ForecastSender {
    tx: mpsc::Sender<ForecastRequest>,
}

impl ForecastSender {
    /// Queue a request. Returns its id so the caller can match the response.
    pub async fn submit(&self, request: ForecastRequest) -> Result<Uuid, WorkerError> {
        let id = request.request_id;
        self.tx.send(request).await.map_err(|_| WorkerError::Closed)?;
        Ok(id)
    }

    /// Completes once the worker has exited.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Responses in submission order. Dropping it stops the worker after the
/// job it is currently computing.
#[derive(Debug)]
pub struct ForecastReceiver {
    rx: mpsc::Receiver<ForecastResponse>,
}

impl ForecastReceiver {
    pub async fn recv(&mut self) -> Option<ForecastResponse> {
        self.rx.recv().await
    }
}

/// Forecasting off the async runtime: a task that pulls requests from one
/// channel, computes on the blocking pool and pushes responses to another.
pub struct ForecastWorker;

impl ForecastWorker {
    pub fn spawn(buffer: usize) -> (ForecastSender, ForecastReceiver) {
        let buffer = buffer.max(1);
        let (request_tx, mut request_rx) = mpsc::channel::<ForecastRequest>(buffer);
        let (response_tx, response_rx) = mpsc::channel::<ForecastResponse>(buffer);

        tokio::spawn(async move {
            tracing::info!(buffer, "Forecast worker started");
            while let Some(request) = request_rx.recv().await {
                if response_tx.is_closed() {
                    break;
                }
                let request_id = request.request_id;
                let label = request.series_label.clone();

                let outcome =
                    match tokio::task::spawn_blocking(move || ForecastEngine::run(&request)).await {
                        Ok(Ok(result)) => ForecastOutcome::Completed(result),
                        Ok(Err(error)) => {
                            tracing::warn!(
                                series = %label,
                                kind = %error.kind,
                                error = %error.message,
                                "Forecast failed"
                            );
                            ForecastOutcome::Failed(error)
                        }
                        Err(e) => {
                            tracing::error!(series = %label, error = %e, "Forecast task aborted");
                            ForecastOutcome::Failed(aborted(&e))
                        }
                    };

                let response = ForecastResponse {
                    request_id,
                    outcome,
                };
                if response_tx.send(response).await.is_err() {
                    break;
                }
            }
            tracing::info!("Forecast worker stopped");
        });

        (
            ForecastSender { tx: request_tx },
            ForecastReceiver { rx: response_rx },
        )
    }
}

/// Error for a forecast whose computation panicked or was cancelled.
///
/// The taxonomy has no dedicated kind for this, so it travels as
/// `SingularMatrixError`; the message says the computation aborted.
fn aborted(reason: &tokio::task::JoinError) -> ClassifiedError {
    let cause = if reason.is_panic() { "panicked" } else { "was cancelled" };
    ClassifiedError::new(
        ErrorKind::SingularMatrixError,
        format!("forecast computation aborted: the task {cause}"),
    )
}
