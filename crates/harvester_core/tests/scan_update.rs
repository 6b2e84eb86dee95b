use std::sync::Once;

use harvester_core::{
    update, Checkpoint, FinishReason, PostId, ScanEffect, ScanMsg, ScanPhase, ScanState,
    MAX_STALE_REQUERIES,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(harvest_logging::initialize_for_tests);
}

fn id(raw: u64) -> PostId {
    PostId::new(raw).unwrap()
}

/// Replays the scanner loop against a feed whose visible posts grow with each
/// load-more. Returns the final state and the posts harvested, in order.
fn replay(checkpoint: u64, batches: &[&[u64]]) -> (ScanState, Vec<u64>) {
    let mut state = ScanState::new(Checkpoint::new(checkpoint));
    let mut harvested = Vec::new();
    let mut loads = 0usize;

    'scan: loop {
        let batch = batches[loads.min(batches.len() - 1)];
        let (next, _) = update(state, ScanMsg::BatchStarted { visible: batch.len() });
        state = next;
        for raw in batch {
            let (next, effects) = update(state, ScanMsg::PostSeen(id(*raw)));
            state = next;
            for effect in effects {
                match effect {
                    ScanEffect::Harvest(post) => {
                        harvested.push(post.get());
                        let (next, _) = update(state, ScanMsg::PostHarvested(post));
                        state = next;
                    }
                    ScanEffect::Finish(_) => break 'scan,
                    other => panic!("unexpected effect {other:?}"),
                }
            }
        }
        let (next, effects) = update(state, ScanMsg::BatchExhausted);
        state = next;
        match effects.as_slice() {
            [ScanEffect::LoadMore] => loads += 1,
            [ScanEffect::Finish(_)] => break,
            other => panic!("unexpected effects {other:?}"),
        }
    }

    (state, harvested)
}

#[test]
fn scan_halts_at_first_post_covered_by_checkpoint() {
    init_logging();
    let (state, harvested) = replay(100, &[&[105, 104, 103, 99, 98]]);

    assert_eq!(harvested, vec![105, 104, 103]);
    let summary = state.summary();
    assert_eq!(summary.processed, vec![id(103), id(104), id(105)]);
    assert_eq!(summary.next_checkpoint, Some(Checkpoint::new(105)));
    assert_eq!(summary.finish, Some(FinishReason::ReachedCheckpoint(id(99))));
}

#[test]
fn nothing_newer_than_checkpoint_processes_nothing() {
    init_logging();
    let (state, harvested) = replay(50, &[&[50, 49, 48]]);

    assert!(harvested.is_empty());
    assert!(state.processed().is_empty());
    assert_eq!(state.summary().next_checkpoint, None);
}

#[test]
fn posts_revisited_after_scroll_are_harvested_once() {
    init_logging();
    let (state, harvested) = replay(10, &[&[20, 19], &[20, 19, 18, 17], &[20, 19, 18, 17, 9]]);

    assert_eq!(harvested, vec![20, 19, 18, 17]);
    assert_eq!(state.processed().len(), 4);
    assert_eq!(state.summary().next_checkpoint, Some(Checkpoint::new(20)));
}

#[test]
fn feed_without_older_posts_finishes_as_exhausted() {
    init_logging();
    let (state, harvested) = replay(0, &[&[3, 2, 1]]);

    assert_eq!(harvested, vec![3, 2, 1]);
    assert_eq!(state.phase(), ScanPhase::Finished(FinishReason::FeedExhausted));
    // One productive pass, then the default three idle load-mores, then stop.
    assert_eq!(state.summary().passes, 5);
}

#[test]
fn empty_feed_finishes_as_exhausted() {
    init_logging();
    let (state, harvested) = replay(0, &[&[]]);

    assert!(harvested.is_empty());
    assert_eq!(state.summary().finish, Some(FinishReason::FeedExhausted));
    assert_eq!(state.summary().next_checkpoint, None);
}

#[test]
fn stale_reference_requests_requery_without_finishing() {
    init_logging();
    let state = ScanState::new(Checkpoint::new(1));
    let (state, effects) = update(state, ScanMsg::StaleReference);

    assert_eq!(effects, vec![ScanEffect::Requery]);
    assert_eq!(state.phase(), ScanPhase::Scanning);
}

#[test]
fn work_before_a_stale_restart_still_counts_as_progress() {
    init_logging();
    let state = ScanState::with_max_idle_scrolls(Checkpoint::new(1), 0);
    let (state, _) = update(state, ScanMsg::BatchStarted { visible: 2 });
    let (state, _) = update(state, ScanMsg::PostHarvested(id(5)));
    let (state, effects) = update(state, ScanMsg::StaleReference);
    assert_eq!(effects, vec![ScanEffect::Requery]);

    let (state, _) = update(state, ScanMsg::BatchStarted { visible: 2 });
    let (state, effects) = update(state, ScanMsg::PostSeen(id(5)));
    assert!(effects.is_empty());
    let (_state, effects) = update(state, ScanMsg::BatchExhausted);
    assert_eq!(effects, vec![ScanEffect::LoadMore]);
}

#[test]
fn persistent_stale_batch_falls_through_to_load_more() {
    init_logging();
    let mut state = ScanState::new(Checkpoint::new(1));
    for _ in 0..MAX_STALE_REQUERIES {
        let (next, _) = update(state, ScanMsg::BatchStarted { visible: 1 });
        let (next, effects) = update(next, ScanMsg::StaleReference);
        assert_eq!(effects, vec![ScanEffect::Requery]);
        state = next;
    }

    let (state, _) = update(state, ScanMsg::BatchStarted { visible: 1 });
    let (state, effects) = update(state, ScanMsg::StaleReference);
    assert_eq!(effects, vec![ScanEffect::LoadMore]);

    // The streak starts over after the scroll.
    let (_state, effects) = update(state, ScanMsg::StaleReference);
    assert_eq!(effects, vec![ScanEffect::Requery]);
}

#[test]
fn feed_that_only_goes_stale_eventually_finishes() {
    init_logging();
    let mut state = ScanState::with_max_idle_scrolls(Checkpoint::new(1), 1);
    let mut stale_reads = 0;
    while !state.is_finished() {
        assert!(stale_reads < 100, "scan never finished");
        let (next, _) = update(state, ScanMsg::BatchStarted { visible: 1 });
        let (next, _) = update(next, ScanMsg::StaleReference);
        state = next;
        stale_reads += 1;
    }

    assert_eq!(
        state.phase(),
        ScanPhase::Finished(FinishReason::FeedExhausted)
    );
    assert_eq!(stale_reads, 2 * (MAX_STALE_REQUERIES as usize + 1));
}

#[test]
fn finished_scan_ignores_further_messages() {
    init_logging();
    let state = ScanState::new(Checkpoint::new(10));
    let (state, effects) = update(state, ScanMsg::PostSeen(id(10)));
    assert_eq!(
        effects,
        vec![ScanEffect::Finish(FinishReason::ReachedCheckpoint(id(10)))]
    );

    let (state, effects) = update(state, ScanMsg::PostSeen(id(11)));
    assert!(effects.is_empty());
    let (_state, effects) = update(state, ScanMsg::BatchExhausted);
    assert!(effects.is_empty());
}

#[test]
fn harvest_reports_for_old_posts_are_ignored() {
    init_logging();
    let state = ScanState::new(Checkpoint::new(10));
    let (state, _) = update(state, ScanMsg::PostHarvested(id(7)));

    assert!(state.processed().is_empty());
}

#[test]
fn checkpoint_never_decreases() {
    init_logging();
    for (checkpoint, feed) in [(0u64, vec![4u64, 2]), (7, vec![9, 8, 3]), (30, vec![12])] {
        let (state, _) = replay(checkpoint, &[feed.as_slice()]);
        let next = state
            .summary()
            .next_checkpoint
            .unwrap_or(Checkpoint::new(checkpoint));
        assert!(next >= Checkpoint::new(checkpoint), "{feed:?}");
    }
}
