// tests/status_log.rs

use std::fs;

use proptest::prelude::*;
use warehouse::status::{LogLine, State, StatusEvent, StatusLog, StatusSnapshot, Timestamp, Verb, status_path};

fn ts(micros: u32) -> Timestamp {
    Timestamp::parse(&format!("20240101_000000_{micros:06}")).unwrap()
}

fn at(micros: u32, state: &str) -> StatusEvent {
    StatusEvent::new(state.parse().unwrap()).with_timestamp(ts(micros))
}

#[test]
fn log_keeps_identity_comments_and_events() {
    let tmp = tempfile::tempdir().unwrap();
    let id = "E3SM.1_0.piControl.LR.atmos.native.model-output.mon.ens1";
    let log = StatusLog::open(status_path(tmp.path(), id), id).unwrap();
    log.append(&at(2, "POSTPROCESS:ClimoGen:Pass")).unwrap();
    log.append(&at(1, "POSTPROCESS:ClimoGen:Engaged")).unwrap();

    let mut raw = fs::read_to_string(log.path()).unwrap();
    raw.push_str("operator note: rerun after quota fix\n");
    fs::write(log.path(), raw).unwrap();

    let lines: Vec<LogLine> = log.read().unwrap().collect();
    assert_eq!(lines[0], LogLine::Identity(id.to_string()));
    assert!(matches!(lines.last(), Some(LogLine::Comment(_))));

    // Reopening never rewrites the identity line.
    let again = StatusLog::open(log.path(), id).unwrap();
    assert_eq!(again.events().unwrap().len(), 2);

    let snap = again.snapshot().unwrap();
    assert_eq!(
        snap.current_state().unwrap().to_string(),
        "POSTPROCESS:ClimoGen:Pass"
    );
    let (last, previous) = snap.last_two();
    assert_eq!(last.unwrap().state.verb, Verb::Pass);
    assert_eq!(previous.unwrap().state.verb, Verb::Engaged);
}

#[test]
fn messages_and_params_survive_the_line_codec() {
    let event = StatusEvent::new(State::new("POSTPROCESS", "ClimoGen", Verb::Fail))
        .with_message("ncclimo: exit 3");
    let parsed = StatusEvent::parse_line(&event.to_line()).unwrap();
    assert_eq!(parsed.message.as_deref(), Some("ncclimo: exit 3"));
    assert!(parsed.params.is_empty());

    assert!(StatusEvent::parse_line("STAT:yesterday:A:B:Pass").is_none());
    assert!(StatusEvent::parse_line("STAT:20240101_000000_000000:A::Pass").is_none());
}

#[derive(Debug, Clone)]
enum Gate {
    Block,
    Unblock,
    Step(bool),
}

fn gate() -> impl Strategy<Value = Gate> {
    prop_oneof![
        Just(Gate::Block),
        Just(Gate::Unblock),
        any::<bool>().prop_map(Gate::Step),
    ]
}

proptest! {
    /// Gate markers never become the current state, and the latest toggle
    /// decides whether the dataset is blocked.
    #[test]
    fn latest_toggle_wins_and_gates_are_not_current(gates in proptest::collection::vec(gate(), 1..40)) {
        let events: Vec<StatusEvent> = gates
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let state = match g {
                    Gate::Block => "WAREHOUSE:DATASET:Blocked",
                    Gate::Unblock => "WAREHOUSE:DATASET:Unblocked",
                    Gate::Step(true) => "POSTPROCESS:ClimoGen:Pass",
                    Gate::Step(false) => "POSTPROCESS:ClimoGen:Fail",
                };
                at(i as u32, state)
            })
            .collect();
        let snap = StatusSnapshot::new(events);

        let expected_blocked = gates
            .iter()
            .rev()
            .find_map(|g| match g {
                Gate::Block => Some(true),
                Gate::Unblock => Some(false),
                Gate::Step(_) => None,
            })
            .unwrap_or(false);
        prop_assert_eq!(snap.is_blocked(), expected_blocked);

        let expected_current = gates.iter().rev().find_map(|g| match g {
            Gate::Step(true) => Some(Verb::Pass),
            Gate::Step(false) => Some(Verb::Fail),
            _ => None,
        });
        prop_assert_eq!(snap.current_state().map(|s| s.verb.clone()), expected_current);
    }

    /// The snapshot orders by timestamp regardless of file order.
    #[test]
    fn snapshot_is_sorted_by_timestamp(mut micros in proptest::collection::vec(0u32..999_999, 1..30)) {
        let events: Vec<StatusEvent> = micros
            .iter()
            .map(|m| at(*m, "POSTPROCESS:ClimoGen:Ready"))
            .collect();
        let snap = StatusSnapshot::new(events);

        micros.sort();
        let got: Vec<String> = snap.events().iter().map(|e| e.timestamp.to_string()).collect();
        let want: Vec<String> = micros.iter().map(|m| ts(*m).to_string()).collect();
        prop_assert_eq!(got, want);
    }
}
