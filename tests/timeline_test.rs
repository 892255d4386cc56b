// ==========================================
// 资源时间轴集成测试
// ==========================================
// 职责: 验证产能区间与块列表在插单前后的不变量
// 场景: 区间覆盖、在线时长、块有序不重叠
// ==========================================


use insert_jobs_aps::config::SimulationSettings;
use insert_jobs_aps::domain::capacity::{CapacityInterval, ResourceCapacityIntervalList};
use insert_jobs_aps::domain::types::Ticks;
use insert_jobs_aps::engine::InsertJobsSimulationManager;
use test_helpers::{block_spans, ScenarioBuilder};

/// 相邻区间首尾相接,相邻区间状态不同
fn assert_partition(list: &ResourceCapacityIntervalList) {
    let intervals: Vec<&CapacityInterval> = list.iter().collect();
    assert_eq!(intervals.first().unwrap().start, Ticks::MIN);
    assert_eq!(intervals.last().unwrap().end, Ticks::MAX);
    for pair in intervals.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
        assert_ne!(pair[0].active, pair[1].active);
    }
}

#[test]
fn test_single_active_interval_online_capacity() {
    let list = ResourceCapacityIntervalList::online_between(0, 1000).unwrap();
    assert_eq!(list.online_capacity_between(100, 900), 800);
    assert_eq!(list.online_capacity_between(900, 100), 0);
    assert_partition(&list);
}

#[test]
fn test_shift_calendar_accounting() {
    // 两个班次,中间停机
    let list = ResourceCapacityIntervalList::from_spans(vec![
        CapacityInterval::new(0, 100, true),
        CapacityInterval::new(200, 300, true),
        CapacityInterval::new(300, 400, true),
    ])
    .unwrap();
    assert_partition(&list);

    assert_eq!(list.online_capacity_between(50, 250), 100);
    assert_eq!(list.end_for_online_duration(50, 100), Some(250));
    assert_eq!(list.end_for_online_duration(350, 100), None);
    assert!(list.has_gap_between(90, 210));
    assert!(!list.has_gap_between(210, 390));
    assert!(list.are_points_continuously_online(200, 400));
    assert!(!list.are_points_continuously_online(50, 250));

    // 排程期外的点落在哨兵区间
    let past = list.find_forward(10_000, None);
    assert_eq!(past, list.past_horizon_index());
    assert!(!list.interval(past).active);
    assert_eq!(list.find_first_online(10_000, None), None);
}

#[test]
fn test_overlapping_spans_rejected() {
    let result = ResourceCapacityIntervalList::from_spans(vec![
        CapacityInterval::new(0, 100, true),
        CapacityInterval::new(50, 150, true),
    ]);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_blocks_stay_ordered_after_run() {
    let mut builder = ScenarioBuilder::new(0, 0);
    let r1 = builder.resource("R1", 0, 5000);
    builder.block(r1, 100, 200).block(r1, 400, 450).block(r1, 900, 1000);
    let jobs: Vec<_> = (0..6)
        .map(|i| builder.job(&format!("J{}", i), 300 + i * 200, 80, vec![r1]))
        .collect();
    let handle = builder.build_handle();

    let manager = InsertJobsSimulationManager::new(handle.clone());
    let summary = manager.run(&jobs, SimulationSettings::default()).await.unwrap();
    assert_eq!(summary.diagnostics.pending, 0);

    let live = handle.read().await;
    let resource = live.resource(r1).unwrap();
    assert!(resource.blocks.validate().is_ok());
    assert_eq!(resource.blocks.len(), 3 + 6);

    let spans = block_spans(&live, r1);
    for pair in spans.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
        assert!(pair[0].1 <= pair[1].0, "blocks overlap: {:?}", pair);
    }
}
