use conduit_core::routing::{
    CollectionAggregator, CorrelationOutcome, CorrelatorConfig, DefaultCompletionPolicy,
    EventCorrelator,
};
use conduit_core::{ConduitError, Event};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

fn part(correlation_id: &str, sequence: usize, size: usize) -> Event {
    Event::builder(json!(format!("{correlation_id}-{sequence}")))
        .correlation_id(correlation_id)
        .correlation_part(sequence, size)
        .build()
}

fn correlator(config: CorrelatorConfig) -> EventCorrelator {
    EventCorrelator::new(config, DefaultCompletionPolicy, CollectionAggregator)
}

#[test]
fn test_concurrent_parts_aggregate_exactly_once_and_late_event_is_routed() {
    let (late_tx, mut late_rx) = mpsc::unbounded_channel::<Event>();
    let correlator = Arc::new(
        EventCorrelator::builder(
            CorrelatorConfig::new("orders"),
            DefaultCompletionPolicy,
            CollectionAggregator,
        )
        .late_event_handler(Arc::new(late_tx))
        .build(),
    );

    for round in 0..50 {
        let id = format!("order-{round}");
        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|sequence| {
                let correlator = correlator.clone();
                let barrier = barrier.clone();
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    correlator.on_event(part(&id, sequence, 3)).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<CorrelationOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let aggregated: Vec<&Event> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                CorrelationOutcome::Aggregated(event) => Some(event),
                _ => None,
            })
            .collect();

        assert_eq!(aggregated.len(), 1, "round {round}: {outcomes:?}");
        assert_eq!(
            aggregated[0].payload(),
            &json!([format!("{id}-0"), format!("{id}-1"), format!("{id}-2")])
        );

        let late = correlator.on_event(part(&id, 3, 3)).unwrap();
        assert!(matches!(late, CorrelationOutcome::Late(_)));
        assert_eq!(late_rx.try_recv().unwrap().correlation_id(), id);
    }

    assert_eq!(correlator.active_groups(), 0);
}

#[test]
fn test_interleaved_groups_never_mix() {
    let correlator = Arc::new(correlator(CorrelatorConfig::new("isolation")));
    let groups = 20;
    let size = 5;

    let handles: Vec<_> = (0..size)
        .map(|sequence| {
            let correlator = correlator.clone();
            thread::spawn(move || {
                let mut aggregated = Vec::new();
                for group in 0..groups {
                    let id = format!("group-{group}");
                    if let CorrelationOutcome::Aggregated(event) =
                        correlator.on_event(part(&id, sequence, size)).unwrap()
                    {
                        aggregated.push(event);
                    }
                }
                aggregated
            })
        })
        .collect();

    let mut by_group: HashMap<String, Event> = HashMap::new();
    for handle in handles {
        for event in handle.join().unwrap() {
            let previous = by_group.insert(event.correlation_id().to_string(), event);
            assert!(previous.is_none(), "group aggregated twice");
        }
    }

    assert_eq!(by_group.len(), groups);
    for (id, event) in by_group {
        let members = event.payload().as_array().unwrap();
        assert_eq!(members.len(), size);
        for (sequence, member) in members.iter().enumerate() {
            assert_eq!(member, &json!(format!("{id}-{sequence}")));
        }
    }
}

#[tokio::test]
async fn test_timeout_monitor_aggregates_partial_group() {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<Event>();
    let correlator = EventCorrelator::builder(
        CorrelatorConfig::new("partial").with_timeout(Duration::from_millis(150), false),
        DefaultCompletionPolicy,
        CollectionAggregator,
    )
    .output_sink(Arc::new(output_tx))
    .build();
    correlator.enable_timeout_monitor().unwrap();

    correlator.on_event(part("slow", 0, 3)).unwrap();
    correlator.on_event(part("slow", 1, 3)).unwrap();

    let partial = tokio::time::timeout(Duration::from_secs(2), output_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partial.payload(), &json!(["slow-0", "slow-1"]));
    assert_eq!(correlator.active_groups(), 0);
    assert!(matches!(
        correlator.on_event(part("slow", 2, 3)).unwrap(),
        CorrelationOutcome::Late(_)
    ));
    correlator.disable_timeout_monitor();
}

#[tokio::test]
async fn test_timeout_monitor_reports_failure() {
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<ConduitError>();
    let correlator = EventCorrelator::builder(
        CorrelatorConfig::new("strict").with_timeout(Duration::from_millis(100), true),
        DefaultCompletionPolicy,
        CollectionAggregator,
    )
    .failure_listener(Arc::new(failure_tx))
    .build();
    correlator.enable_timeout_monitor().unwrap();

    correlator.on_event(part("stuck", 0, 2)).unwrap();

    let failure = tokio::time::timeout(Duration::from_secs(2), failure_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match failure {
        ConduitError::CorrelationTimeout {
            correlation_id,
            received,
            expected,
        } => {
            assert_eq!(correlation_id, "stuck");
            assert_eq!(received, 1);
            assert_eq!(expected, Some(2));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
async fn test_response_waiter_sees_timeout_failure() {
    let correlator = Arc::new(correlator(
        CorrelatorConfig::new("responses").with_timeout(Duration::from_millis(100), true),
    ));
    correlator.enable_timeout_monitor().unwrap();
    correlator.on_event(part("reply", 0, 2)).unwrap();

    let err = correlator
        .await_response("reply", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::CorrelationTimeout { .. }));
}
