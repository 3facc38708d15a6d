use std::cell::RefCell;

use super::*;
use crate::{Aggregator, AggregatorConfig, PhaseDesc, SchedulerConfig, Task, TechniqueId};

type Log = RefCell<Vec<(u32, Vec<usize>)>>;

fn phases() -> PhaseTable {
    PhaseTable::new(vec![
        PhaseDesc::sorted("opaque"),
        PhaseDesc::unsorted("overlay"),
    ])
    .unwrap()
}

/// Consolidate `(phase, priority, technique)` triples submitted in order; payload is the index.
fn planned(tasks: &[(u32, u32, u32)]) -> Scheduler<usize> {
    let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
    let mut agg = Aggregator::new(&s, AggregatorConfig::default()).unwrap();
    for (i, &(phase, priority, technique)) in tasks.iter().enumerate() {
        let mut batch = agg.make_batch(PhaseId(phase));
        batch.add(priority, TechniqueId(technique), i);
        batch.flush();
    }
    s.consolidate(&mut agg, &phases(), |_| {}).unwrap();
    s
}

/// Table of `n` techniques that append `(technique, payloads)` to `log` on every call.
fn logging_table(log: &Log, n: u32) -> TechniqueTable<'_, usize> {
    let mut table = TechniqueTable::new();
    for id in 0..n {
        table.register(format!("t{id}"), move |tasks: &[Task<usize>]| {
            log.borrow_mut()
                .push((id, tasks.iter().map(|t| t.data).collect()));
        });
    }
    table
}

#[test]
fn runs_of_one_technique_are_dispatched_together() {
    let s = planned(&[
        (1, 0, 0),
        (1, 0, 0),
        (1, 0, 1),
        (1, 0, 1),
        (1, 0, 1),
        (1, 0, 0),
    ]);
    let log = Log::default();
    let mut table = logging_table(&log, 2);

    let stats = s.execute(PhaseId(1), &mut table).unwrap();
    assert_eq!(stats, ExecuteStats { tasks: 6, runs: 3 });
    drop(table);
    assert_eq!(
        log.into_inner(),
        vec![(0, vec![0, 1]), (1, vec![2, 3, 4]), (0, vec![5])]
    );
}

#[test]
fn sorted_phase_groups_techniques_by_priority() {
    let s = planned(&[(0, 1, 1), (0, 0, 0), (0, 1, 1), (0, 0, 0), (0, 2, 2)]);
    let log = Log::default();
    let mut table = logging_table(&log, 3);

    let stats = s.execute(PhaseId(0), &mut table).unwrap();
    assert_eq!(stats, ExecuteStats { tasks: 5, runs: 3 });
    drop(table);
    assert_eq!(
        log.into_inner(),
        vec![(0, vec![1, 3]), (1, vec![0, 2]), (2, vec![4])]
    );
}

#[test]
fn every_task_is_dispatched_exactly_once() {
    let tasks: Vec<(u32, u32, u32)> = (0..200).map(|i| (i % 2, i % 7, i % 3)).collect();
    let s = planned(&tasks);
    let log = Log::default();
    let mut table = logging_table(&log, 3);

    let stats = s.execute_all(&phases(), &mut table).unwrap();
    assert_eq!(stats.iter().map(|st| st.tasks).sum::<usize>(), 200);
    drop(table);

    let log = log.into_inner();
    for (technique, payloads) in &log {
        assert!(payloads.iter().all(|&i| tasks[i].2 == *technique));
    }
    let mut seen: Vec<usize> = log.into_iter().flat_map(|(_, p)| p).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..200).collect::<Vec<_>>());
}

#[test]
fn execute_all_follows_table_order() {
    let s = planned(&[(1, 0, 1), (0, 0, 0), (1, 0, 1), (0, 0, 0)]);
    let log = Log::default();
    let mut table = logging_table(&log, 2);

    let stats = s.execute_all(&phases(), &mut table).unwrap();
    assert_eq!(
        stats,
        vec![
            ExecuteStats { tasks: 2, runs: 1 },
            ExecuteStats { tasks: 2, runs: 1 },
        ]
    );
    drop(table);
    assert_eq!(log.into_inner(), vec![(0, vec![1, 3]), (1, vec![0, 2])]);
}

#[test]
fn empty_phase_dispatches_nothing() {
    let s = planned(&[(1, 0, 0)]);
    let mut table = TechniqueTable::new();
    table.register("never", |_: &[Task<usize>]| panic!("no tasks in phase 0"));
    assert_eq!(
        s.execute(PhaseId(0), &mut table).unwrap(),
        ExecuteStats::default()
    );
}

#[test]
fn unregistered_technique_fails_the_phase() {
    let s = planned(&[(0, 0, 0), (0, 1, 5)]);
    let log = Log::default();
    let mut table = logging_table(&log, 1);
    let err = s.execute(PhaseId(0), &mut table).unwrap_err();
    assert!(matches!(err, FrameplanError::Execution(_)));
}

#[test]
fn phases_outside_the_plan_are_rejected() {
    let s = planned(&[(0, 0, 0)]);
    let mut table = TechniqueTable::<usize>::new();
    assert!(matches!(
        s.execute(PhaseId(2), &mut table),
        Err(FrameplanError::Execution(_))
    ));

    let single = PhaseTable::new(vec![PhaseDesc::unsorted("only")]).unwrap();
    assert!(matches!(
        s.execute_all(&single, &mut table),
        Err(FrameplanError::Execution(_))
    ));
}
