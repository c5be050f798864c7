mod common;

use common::strategies::*;
use common::*;
use conduit_core::{Event, ProcessorChain};
use proptest::prelude::*;
use serde_json::json;

fn run(chain: &ProcessorChain, payload: &str) -> Option<Event> {
    runtime()
        .block_on(chain.process(text_event(payload)))
        .expect("chain should not fail")
}

proptest! {
    /// Property: the empty chain returns its input unchanged
    #[test]
    fn empty_chain_is_identity(payload in payload_strategy()) {
        let event = text_event(&payload);
        let result = runtime().block_on(ProcessorChain::empty().process(event.clone())).unwrap();
        prop_assert_eq!(result, Some(event));
    }

    /// Property: chain(chain(a, b), c) behaves like chain(a, chain(b, c))
    #[test]
    fn composition_is_associative(
        a in tags_strategy(4),
        b in tags_strategy(4),
        c in tags_strategy(4),
        payload in payload_strategy(),
    ) {
        let left = ProcessorChain::builder()
            .processor(ProcessorChain::builder()
                .processor(tagged_chain(&a))
                .processor(tagged_chain(&b))
                .build())
            .processor(tagged_chain(&c))
            .build();
        let right = ProcessorChain::builder()
            .processor(tagged_chain(&a))
            .processor(ProcessorChain::builder()
                .processor(tagged_chain(&b))
                .processor(tagged_chain(&c))
                .build())
            .build();

        let expected = format!("{payload}{}{}{}", a.concat(), b.concat(), c.concat());
        let left_out = run(&left, &payload).map(|e| e.payload().clone());
        let right_out = run(&right, &payload).map(|e| e.payload().clone());
        prop_assert_eq!(left_out.clone(), Some(json!(expected)));
        prop_assert_eq!(left_out, right_out);
    }

    /// Property: nothing after a step returning None runs
    #[test]
    fn short_circuit_skips_remaining_steps(
        before in tags_strategy(4),
        after in tags_strategy(4),
        payload in payload_strategy(),
    ) {
        let mut builder = ProcessorChain::builder();
        for tag in &before {
            builder = builder.processor(append(tag));
        }
        builder = builder.processor(stop("halt"));
        for tag in &after {
            builder = builder.processor(append(tag));
        }
        let chain = builder.build();

        prop_assert_eq!(chain.len(), before.len() + after.len() + 1);
        prop_assert!(run(&chain, &payload).is_none());
    }

    /// Property: steps run in declaration order
    #[test]
    fn steps_run_in_order(tags in tags_strategy(8), payload in payload_strategy()) {
        let result = run(&tagged_chain(&tags), &payload).unwrap();
        prop_assert_eq!(result.payload(), &json!(format!("{payload}{}", tags.concat())));
    }
}

#[tokio::test]
async fn test_failing_step_is_reported_with_context() {
    let chain = ProcessorChain::builder()
        .named("billing")
        .processor(append("a"))
        .processor(fail("charge-card", "card declined"))
        .processor(append("b"))
        .build();

    let event = text_event("x");
    let err = chain.process(event.clone()).await.unwrap_err();
    match err {
        conduit_core::ConduitError::ChainStep { step, correlation_id, source } => {
            assert_eq!(step, "charge-card");
            assert_eq!(correlation_id, event.correlation_id());
            assert_eq!(source.to_string(), "Processing error: card declined");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
