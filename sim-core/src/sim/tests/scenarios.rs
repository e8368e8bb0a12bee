use tokio::sync::mpsc;

use crate::{
    config::{IidConfig, MomoseRenConfig, ParticipationConfig, RawConfig, SimConfiguration},
    events::{Event, EventTracker},
    sim::{Simulation, metrics::Summary},
};

fn new_config(
    n: u64,
    t_horizon: u64,
    probability_lottery_block: f64,
    probability_lottery_vote: f64,
    participation: ParticipationConfig,
) -> SimConfiguration {
    RawConfig {
        seed: Some(17),
        t_horizon,
        n,
        probability_lottery_block,
        probability_lottery_vote,
        confirm_slow_kappa: Some(3),
        confirm_fast_eps: None,
        trace_blocks: false,
        participation,
    }
    .into()
}

fn iid() -> ParticipationConfig {
    ParticipationConfig::IidParticipation(IidConfig {
        fraction_iid: 0.5,
        fraction_participation_lb: 0.3,
    })
}

fn momose_ren() -> ParticipationConfig {
    ParticipationConfig::MomoseRenParticipation(MomoseRenConfig {
        fraction_warmup: 0.3,
        fraction_crement: 0.02,
        fraction_low_participation_lb: 0.1,
        fraction_low_participation_ub: 0.3,
        fraction_high_participation_lb: 0.6,
        fraction_high_participation_ub: 0.9,
    })
}

fn run(config: SimConfiguration) -> (Summary, Vec<Event>) {
    let (sink, mut source) = mpsc::unbounded_channel();
    let summary = {
        let mut sim = Simulation::new(config, EventTracker::new(sink)).unwrap();
        sim.run().unwrap()
    };
    let mut events = vec![];
    while let Ok(event) = source.try_recv() {
        events.push(event);
    }
    (summary, events)
}

fn rounds(events: &[Event]) -> Vec<&crate::sim::metrics::RoundRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Round(record) => Some(record),
            _ => None,
        })
        .collect()
}

#[test]
fn should_produce_identical_streams_from_identical_seeds() {
    let serialize = |events: Vec<Event>| -> Vec<String> {
        events
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect()
    };
    let (_, first) = run(new_config(50, 200, 0.05, 0.4, iid()));
    let (_, second) = run(new_config(50, 200, 0.05, 0.4, iid()));
    assert_eq!(serialize(first), serialize(second));
}

#[test]
fn should_change_the_stream_with_the_seed() {
    let mut config = new_config(50, 200, 0.05, 0.4, iid());
    let (_, first) = run(config.clone());
    config.seed += 1;
    let (_, second) = run(config);
    let online = |events: &[Event]| -> Vec<usize> {
        rounds(events).iter().map(|r| r.online).collect()
    };
    assert_ne!(online(&first), online(&second));
}

#[test]
fn should_grow_one_block_per_round_when_everyone_wins() {
    let (summary, events) = run(new_config(
        10,
        5,
        1.0,
        1.0,
        ParticipationConfig::FullParticipation,
    ));
    let records = rounds(&events);
    assert_eq!(records.len(), 6);
    for (r, record) in records.iter().enumerate() {
        assert_eq!(record.round.number(), r as u64);
        assert_eq!(record.online, 10);
        assert_eq!(record.proposers, 10);
        assert_eq!(record.blocks_created, 10);
        assert_eq!(record.forks_created, 9);
        assert_eq!(record.voters, 10);
        assert_eq!(record.votes_counted, 10);
        assert_eq!(record.chain_length, r as u64 + 1);
        assert!(!record.reorg);
        // everyone votes for last round's block, the k-deep tip trails by kappa
        assert_eq!(record.fast_confirmed_depth, r as u64);
        assert_eq!(record.fast_confirmed_round.number(), (r as u64).saturating_sub(1));
        assert_eq!(record.confirmed_round.number(), (r as u64).saturating_sub(3));
        assert_eq!(record.best_confirmed_round, record.fast_confirmed_round);
    }
    assert_eq!(records[4].chain_length, 5);
    assert_eq!(summary.total_blocks, 60);
    assert_eq!(summary.final_chain_length, 6);
    assert_eq!(summary.orphaned_blocks, 54);
    assert_eq!(summary.total_forks, 54);
    assert_eq!(summary.confirmed_round.number(), 2);
    assert_eq!(summary.fast_confirmed_round.number(), 4);
    assert_eq!(summary.best_confirmed_round.number(), 4);
    assert_eq!(summary.participation.mean, 1.0);
    assert_eq!(summary.participation.std_dev, 0.0);
}

#[test]
fn should_never_grow_without_proposers() {
    let (summary, events) = run(new_config(
        20,
        50,
        0.0,
        0.5,
        ParticipationConfig::FullParticipation,
    ));
    assert!(rounds(&events).iter().all(|r| r.chain_length == 0));
    assert_eq!(summary.final_chain_length, 0);
    assert_eq!(summary.total_blocks, 0);
}

#[test]
fn should_never_shorten_the_chain() {
    let (_, events) = run(new_config(100, 300, 0.02, 0.3, momose_ren()));
    let records = rounds(&events);
    for pair in records.windows(2) {
        assert!(pair[0].chain_length <= pair[1].chain_length);
        assert!(pair[0].best_confirmed_depth <= pair[1].best_confirmed_depth);
        assert!(pair[0].best_confirmed_round <= pair[1].best_confirmed_round);
    }
    for record in records {
        assert!(record.confirmed_round <= record.round);
        assert!(record.best_confirmed_round <= record.round);
    }
}

#[test]
fn should_count_one_vote_per_online_voter() {
    let (_, events) = run(new_config(100, 300, 0.02, 0.3, momose_ren()));
    for record in rounds(&events) {
        assert_eq!(record.votes_counted, record.voters as u64);
        assert!(record.voters <= record.online);
        assert!(record.proposers <= record.online);
    }
}

#[test]
fn should_emit_config_then_rounds_then_summary() {
    let (summary, events) = run(new_config(5, 9, 0.3, 0.5, iid()));
    assert_eq!(events.len(), 12);
    assert!(matches!(events.first(), Some(Event::Config(_))));
    assert!(matches!(events.last(), Some(Event::Summary(s)) if *s == summary));
    for (r, event) in events[1..11].iter().enumerate() {
        assert!(matches!(event, Event::Round(record) if record.round.number() == r as u64));
    }
}

#[test]
fn should_trace_every_proposed_block_on_request() {
    let mut config = new_config(20, 30, 0.1, 0.5, iid());
    config.trace_blocks = true;
    let (summary, events) = run(config);
    let proposed = events
        .iter()
        .filter(|e| matches!(e, Event::BlockProposed { .. }))
        .count();
    assert_eq!(proposed, summary.total_blocks);
}

#[test]
fn should_refuse_invalid_configurations() {
    let (sink, _source) = mpsc::unbounded_channel();
    let config = new_config(0, 10, 0.5, 0.5, ParticipationConfig::FullParticipation);
    assert!(Simulation::new(config, EventTracker::new(sink)).is_err());
}
