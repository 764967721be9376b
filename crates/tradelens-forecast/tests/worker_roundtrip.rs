//! Round trips through the forecast worker: ordering, error transport and
//! abandonment by dropping the output channel.
//!
//! Run with:
//! ```bash
//! cargo test -p tradelens-forecast --test worker_roundtrip
//! ```

use std::time::Duration;

use tradelens_forecast::{ForecastEngine, ForecastWorker, WorkerError};
use tradelens_models::{ErrorKind, ForecastConfig, ForecastOutcome, ForecastRequest};

fn gdp_series() -> Vec<Option<f64>> {
    (0..20)
        .map(|i| if i == 7 { None } else { Some(1.0e12 * 1.05_f64.powi(i)) })
        .collect()
}

#[tokio::test]
async fn responses_arrive_in_submission_order() {
    let config = ForecastConfig::default();
    let (sender, mut receiver) = ForecastWorker::spawn(config.worker_buffer);

    let mut ids = Vec::new();
    for label in ["IND", "CHN", "USA"] {
        let request = ForecastRequest::new(label, gdp_series()).with_config(&config);
        ids.push(sender.submit(request).await.unwrap());
    }

    for (expected_id, label) in ids.iter().zip(["IND", "CHN", "USA"]) {
        let response = receiver.recv().await.unwrap();
        assert_eq!(&response.request_id, expected_id);
        let result = response.into_result().unwrap();
        assert_eq!(result.series_label, label);
        assert_eq!(result.seasonal_trend_forecast.len(), config.horizon);
    }
}

#[tokio::test]
async fn worker_matches_direct_engine_call() {
    let (sender, mut receiver) = ForecastWorker::spawn(2);
    let request = ForecastRequest::new("direct", gdp_series());
    let expected = ForecastEngine::run(&request).unwrap();

    sender.submit(request).await.unwrap();
    let actual = receiver.recv().await.unwrap().into_result().unwrap();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn classified_errors_cross_the_channel() {
    let (sender, mut receiver) = ForecastWorker::spawn(2);
    let mut request = ForecastRequest::new("singular", vec![Some(1.0), Some(2.0), Some(3.0)]);
    request.regressors = Some(vec![vec![0.0], vec![0.0], vec![0.0]]);
    sender.submit(request).await.unwrap();

    let response = receiver.recv().await.unwrap();
    match response.outcome {
        ForecastOutcome::Failed(error) => assert_eq!(error.kind, ErrorKind::SingularMatrixError),
        other => panic!("expected failure, got {other:?}"),
    }

    // The worker keeps serving after a failed job.
    sender
        .submit(ForecastRequest::new("after", gdp_series()))
        .await
        .unwrap();
    assert!(receiver.recv().await.unwrap().into_result().is_ok());
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_worker() {
    let (sender, receiver) = ForecastWorker::spawn(1);
    drop(receiver);

    // The next request wakes the worker, which sees nobody is listening.
    let _ = sender.submit(ForecastRequest::new("ignored", gdp_series())).await;
    tokio::time::timeout(Duration::from_secs(2), sender.closed())
        .await
        .expect("worker should exit once its output is abandoned");

    assert!(sender.is_closed());
    assert!(matches!(
        sender
            .submit(ForecastRequest::new("late", gdp_series()))
            .await,
        Err(WorkerError::Closed)
    ));
}
