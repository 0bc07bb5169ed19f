use pretty_assertions::assert_eq;
use pyprune::{HoistKind, OptimizeEvent, OptimizeOptions, Optimizer, Pass, RecordingTracer, parse};

fn trace(code: &str) -> Vec<OptimizeEvent> {
    let mut optimizer = Optimizer::new(OptimizeOptions::default()).with_tracer(RecordingTracer::new());
    optimizer.optimize(parse(code).unwrap()).unwrap();
    optimizer.into_tracer().into_events()
}

/// Events other than round and pass bookkeeping.
fn decisions(events: Vec<OptimizeEvent>) -> Vec<OptimizeEvent> {
    events
        .into_iter()
        .filter(|event| {
            !matches!(
                event,
                OptimizeEvent::RoundStart { .. } | OptimizeEvent::RoundEnd { .. } | OptimizeEvent::PassRun { .. }
            )
        })
        .collect()
}

#[test]
fn rounds_run_both_passes_until_nothing_changes() {
    let events = trace("def f():\n    x = 1\n    return 2\n");
    assert_eq!(
        events,
        vec![
            OptimizeEvent::RoundStart { round: 1 },
            OptimizeEvent::PassRun {
                pass: Pass::RemoveUseless,
                round: 1
            },
            OptimizeEvent::StatementRemoved { kind: "assign", line: 2 },
            OptimizeEvent::PassRun {
                pass: Pass::HoistInvariants,
                round: 1
            },
            OptimizeEvent::RoundEnd { round: 1, changed: true },
            OptimizeEvent::RoundStart { round: 2 },
            OptimizeEvent::PassRun {
                pass: Pass::RemoveUseless,
                round: 2
            },
            OptimizeEvent::PassRun {
                pass: Pass::HoistInvariants,
                round: 2
            },
            OptimizeEvent::RoundEnd { round: 2, changed: false },
        ]
    );
}

#[test]
fn removed_compound_statements_are_reported_once() {
    let events = decisions(trace(
        "def func():\n    x = 10\n    for i in range(10):\n        x += 1\n        a = x + 7\n    return 42\n",
    ));
    assert_eq!(
        events,
        vec![
            OptimizeEvent::StatementRemoved { kind: "assign", line: 2 },
            OptimizeEvent::StatementRemoved { kind: "for", line: 3 },
        ]
    );
}

#[test]
fn hoists_are_reported_with_their_loop() {
    let events = decisions(trace("def fill_sum(a, x, y):\n    for i in range(len(a)): a[i] = x + y\n"));
    assert_eq!(
        events,
        vec![OptimizeEvent::Hoisted {
            name: "__o_tmp_2".to_owned(),
            kind: HoistKind::Partial,
            line: 2,
            loop_line: 2,
        }]
    );
}

#[test]
fn replaced_loops_and_pinned_bindings_are_reported() {
    let events = decisions(trace("def f(xs):\n    for x in [g(v) for v in xs]:\n        pass\n"));
    assert_eq!(events, vec![OptimizeEvent::LoopReplaced { line: 2 }]);

    // pinning changes nothing, so one round settles it
    let events = trace("def f():\n    print(x)\n    x = 2\n");
    assert!(events.contains(&OptimizeEvent::BindingPinned {
        name: "x".to_owned(),
        line: 3
    }));
    assert_eq!(events.last(), Some(&OptimizeEvent::RoundEnd { round: 1, changed: false }));
}

#[test]
fn events_display_as_log_lines() {
    let lines: Vec<String> = trace("def f():\n    x = 1\n    return 2\n")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(lines[0], "round 1: start");
    assert_eq!(lines[2], "line 2: removed assign");
    assert_eq!(lines.last().map(String::as_str), Some("round 2: fixpoint"));
}

#[test]
fn a_lent_tracer_keeps_its_events() {
    let mut tracer = RecordingTracer::new();
    let mut optimizer = Optimizer::new(OptimizeOptions::default()).with_tracer(&mut tracer);
    optimizer.optimize(parse("x = 1\n").unwrap()).unwrap();
    assert_eq!(tracer.rounds(), 1);
}
