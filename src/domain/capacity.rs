// ==========================================
// 插单排产系统 - 资源产能区间表
// ==========================================
// 职责: 单个资源的在线/离线时间轴（班次、检修）
// 红线: 区间首尾相接、互不重叠、覆盖整个时间轴
// 红线: 相邻区间状态不同（同状态区间必须合并）
// ==========================================
// 说明: 构造时前补一段离线区间 [MIN, 首区间起点)，
//       后补一段离线"超出排程期"区间 [末区间终点, MAX)，
//       因此任何时间点都能落在唯一区间内,查找永不失败
// ==========================================

use crate::domain::error::{TimelineError, TimelineResult};
use crate::domain::types::Ticks;
use serde::{Deserialize, Serialize};

// ==========================================
// CapacityInterval - 产能区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityInterval {
    pub start: Ticks,  // 起点（含）
    pub end: Ticks,    // 终点（不含）
    pub active: bool,  // 是否在线
}

impl CapacityInterval {
    pub fn new(start: Ticks, end: Ticks, active: bool) -> Self {
        Self { start, end, active }
    }

    /// 时长（无界区间饱和到 Ticks::MAX）
    pub fn duration(&self) -> Ticks {
        self.end.saturating_sub(self.start)
    }

    /// 终点为 Ticks::MAX 的区间视为包含 Ticks::MAX 本身
    pub fn contains(&self, point: Ticks) -> bool {
        self.start <= point && (point < self.end || self.end == Ticks::MAX)
    }
}

// ==========================================
// ResourceCapacityIntervalList - 产能区间表
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCapacityIntervalList {
    intervals: Vec<CapacityInterval>,
}

impl Default for ResourceCapacityIntervalList {
    fn default() -> Self {
        Self::always(true)
    }
}

impl ResourceCapacityIntervalList {
    /// 整个时间轴为同一状态
    pub fn always(active: bool) -> Self {
        Self {
            intervals: vec![CapacityInterval::new(Ticks::MIN, Ticks::MAX, active)],
        }
    }

    /// 单段在线区间,其余时间离线
    pub fn online_between(start: Ticks, end: Ticks) -> TimelineResult<Self> {
        Self::from_spans(vec![CapacityInterval::new(start, end, true)])
    }

    /// 从原始区间构造
    ///
    /// 规则:
    /// 1) 按起点排序,起点 >= 终点视为无效
    /// 2) 区间重叠报错
    /// 3) 空隙补离线区间,首尾补哨兵区间
    /// 4) 合并相邻同状态区间
    pub fn from_spans(mut spans: Vec<CapacityInterval>) -> TimelineResult<Self> {
        spans.sort_by_key(|s| s.start);

        let mut intervals: Vec<CapacityInterval> = Vec::with_capacity(spans.len() * 2 + 2);
        let mut cursor = Ticks::MIN;

        for span in spans {
            if span.start >= span.end {
                return Err(TimelineError::InvalidSpan {
                    start: span.start,
                    end: span.end,
                });
            }
            if span.start < cursor {
                return Err(TimelineError::OverlappingCapacity {
                    start: span.start,
                    end: span.end,
                });
            }
            if span.start > cursor {
                Self::push_merged(&mut intervals, CapacityInterval::new(cursor, span.start, false));
            }
            Self::push_merged(&mut intervals, span);
            cursor = span.end;
        }

        if cursor < Ticks::MAX || intervals.is_empty() {
            Self::push_merged(&mut intervals, CapacityInterval::new(cursor, Ticks::MAX, false));
        }

        Ok(Self { intervals })
    }

    fn push_merged(intervals: &mut Vec<CapacityInterval>, next: CapacityInterval) {
        match intervals.last_mut() {
            Some(last) if last.active == next.active && last.end == next.start => {
                last.end = next.end;
            }
            _ => intervals.push(next),
        }
    }

    // ==========================================
    // 访问器
    // ==========================================

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn interval(&self, index: usize) -> &CapacityInterval {
        &self.intervals[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapacityInterval> {
        self.intervals.iter()
    }

    /// 末尾"超出排程期"哨兵区间的序号
    pub fn past_horizon_index(&self) -> usize {
        self.intervals.len() - 1
    }

    // ==========================================
    // 查找
    // ==========================================

    /// 向前查找包含 point 的区间
    ///
    /// `start_hint` 必须 <= point 所在区间;否则退回从头扫描
    pub fn find_forward(&self, point: Ticks, start_hint: Option<usize>) -> usize {
        let mut index = match start_hint {
            Some(hint) if hint < self.intervals.len() && self.intervals[hint].start <= point => hint,
            _ => 0,
        };

        let last = self.past_horizon_index();
        while index < last && self.intervals[index].end <= point {
            index += 1;
        }
        index
    }

    /// 向后查找包含 point 的区间
    ///
    /// `start_hint` 必须 >= point 所在区间;否则退回从尾扫描
    pub fn find_backward(&self, point: Ticks, start_hint: Option<usize>) -> usize {
        let last = self.past_horizon_index();
        let mut index = match start_hint {
            Some(hint) if hint <= last && self.intervals[hint].contains(point) => return hint,
            Some(hint) if hint <= last && self.intervals[hint].start > point => hint,
            _ => last,
        };

        while index > 0 && self.intervals[index].start > point {
            index -= 1;
        }
        index
    }

    /// point 及之后第一个在线区间
    pub fn find_first_online(&self, point: Ticks, start_hint: Option<usize>) -> Option<usize> {
        let mut index = self.find_forward(point, start_hint);
        while index < self.intervals.len() {
            if self.intervals[index].active {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    // ==========================================
    // 产能核算
    // ==========================================

    /// [start, end) 内在线时长之和;start >= end 返回 0
    pub fn online_capacity_between(&self, start: Ticks, end: Ticks) -> Ticks {
        if start >= end {
            return 0;
        }

        let first = self.find_forward(start, None);
        let last = self.find_forward(end, Some(first));

        if first == last {
            return if self.intervals[first].active { end.saturating_sub(start) } else { 0 };
        }

        let mut total: Ticks = 0;
        for index in first..=last {
            let interval = &self.intervals[index];
            if !interval.active {
                continue;
            }
            let from = interval.start.max(start);
            let to = interval.end.min(end);
            if to > from {
                total = total.saturating_add(to.saturating_sub(from));
            }
        }
        total
    }

    /// 两个在线时间点之间是否存在离线区间或在线区间边界
    ///
    /// 用于校验前后工序是否紧邻
    pub fn has_gap_between(&self, prev_end: Ticks, next_start: Ticks) -> bool {
        if next_start <= prev_end {
            return false;
        }
        let first = self.find_forward(prev_end, None);
        let second = self.find_forward(next_start, Some(first));
        first != second
    }

    /// [start, end) 触及的每个区间是否都在线
    pub fn are_points_continuously_online(&self, start: Ticks, end: Ticks) -> bool {
        let first = self.find_forward(start, None);
        if end <= start {
            return self.intervals[first].active;
        }
        let last = self.find_forward(end - 1, Some(first));
        self.intervals[first..=last].iter().all(|i| i.active)
    }

    /// 从 start 起消耗 duration 个在线 tick 后的结束时间
    ///
    /// 离线区间被跳过;进入"超出排程期"哨兵区间仍不够时返回 None
    pub fn end_for_online_duration(&self, start: Ticks, duration: Ticks) -> Option<Ticks> {
        if duration <= 0 {
            return Some(start);
        }

        let mut index = self.find_forward(start, None);
        let mut cursor = start;
        let mut remaining = duration;

        loop {
            let interval = &self.intervals[index];
            if interval.active {
                if interval.end == Ticks::MAX {
                    return cursor.checked_add(remaining);
                }
                let available = interval.end - cursor;
                if available >= remaining {
                    return Some(cursor + remaining);
                }
                remaining -= available;
            }

            index += 1;
            if index >= self.intervals.len() {
                return None;
            }
            cursor = self.intervals[index].start;
        }
    }

    // ==========================================
    // 变更
    // ==========================================

    /// 将 [start, end) 设置为指定状态（检修、加班等）
    pub fn set_state(&mut self, start: Ticks, end: Ticks, active: bool) -> TimelineResult<()> {
        if start >= end {
            return Err(TimelineError::InvalidSpan { start, end });
        }

        let mut rebuilt: Vec<CapacityInterval> = Vec::with_capacity(self.intervals.len() + 2);
        let mut inserted = false;

        for interval in &self.intervals {
            if interval.end <= start || interval.start >= end {
                if !inserted && interval.start >= end {
                    Self::push_merged(&mut rebuilt, CapacityInterval::new(start, end, active));
                    inserted = true;
                }
                Self::push_merged(&mut rebuilt, *interval);
                continue;
            }
            if interval.start < start {
                Self::push_merged(&mut rebuilt, CapacityInterval::new(interval.start, start, interval.active));
            }
            if !inserted {
                Self::push_merged(&mut rebuilt, CapacityInterval::new(start, end, active));
                inserted = true;
            }
            if interval.end > end {
                Self::push_merged(&mut rebuilt, CapacityInterval::new(end, interval.end, interval.active));
            }
        }

        self.intervals = rebuilt;
        Ok(())
    }

    /// 校验覆盖/不重叠/合并不变量
    pub fn validate(&self) -> TimelineResult<()> {
        let first = self.intervals.first().ok_or(TimelineError::InvalidSpan {
            start: Ticks::MIN,
            end: Ticks::MIN,
        })?;
        if first.start != Ticks::MIN {
            return Err(TimelineError::InvalidSpan {
                start: Ticks::MIN,
                end: first.start,
            });
        }

        for pair in self.intervals.windows(2) {
            if pair[0].start >= pair[0].end {
                return Err(TimelineError::InvalidSpan {
                    start: pair[0].start,
                    end: pair[0].end,
                });
            }
            if pair[0].end != pair[1].start || pair[0].active == pair[1].active {
                return Err(TimelineError::OverlappingCapacity {
                    start: pair[1].start,
                    end: pair[1].end,
                });
            }
        }

        match self.intervals.last() {
            Some(last) if last.end == Ticks::MAX => Ok(()),
            Some(last) => Err(TimelineError::InvalidSpan {
                start: last.end,
                end: Ticks::MAX,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shifts() -> ResourceCapacityIntervalList {
        // 在线: [0,100) [200,300) [400,500)
        ResourceCapacityIntervalList::from_spans(vec![
            CapacityInterval::new(0, 100, true),
            CapacityInterval::new(200, 300, true),
            CapacityInterval::new(400, 500, true),
        ])
        .unwrap()
    }

    #[test]
    fn test_single_interval_capacity() {
        let list = ResourceCapacityIntervalList::online_between(0, 1000).unwrap();
        assert_eq!(list.online_capacity_between(100, 900), 800);
    }

    #[test]
    fn test_capacity_malformed_range_is_zero() {
        let list = shifts();
        assert_eq!(list.online_capacity_between(50, 50), 0);
        assert_eq!(list.online_capacity_between(90, 10), 0);
    }

    #[test]
    fn test_capacity_saturates_at_horizon_edges() {
        let list = ResourceCapacityIntervalList::always(true);
        assert_eq!(list.online_capacity_between(Ticks::MIN, 0), Ticks::MAX);
        assert_eq!(list.online_capacity_between(Ticks::MIN, Ticks::MAX), Ticks::MAX);
        assert_eq!(list.online_capacity_between(-10, 10), 20);
    }

    #[test]
    fn test_capacity_across_offline_spans() {
        let list = shifts();
        // 50 + 100 + 50
        assert_eq!(list.online_capacity_between(50, 450), 200);
        assert_eq!(list.online_capacity_between(100, 200), 0);
    }

    #[test]
    fn test_padding_and_merge() {
        let list = ResourceCapacityIntervalList::from_spans(vec![
            CapacityInterval::new(0, 10, true),
            CapacityInterval::new(10, 20, true),
            CapacityInterval::new(30, 40, false),
        ])
        .unwrap();
        // [MIN,0) 离线, [0,20) 在线, [20,MAX) 离线
        assert_eq!(list.len(), 3);
        assert!(list.validate().is_ok());
        assert_eq!(list.interval(1).start, 0);
        assert_eq!(list.interval(1).end, 20);
    }

    #[test]
    fn test_overlapping_spans_rejected() {
        let result = ResourceCapacityIntervalList::from_spans(vec![
            CapacityInterval::new(0, 10, true),
            CapacityInterval::new(5, 20, false),
        ]);
        assert!(matches!(result, Err(TimelineError::OverlappingCapacity { .. })));
    }

    #[test]
    fn test_find_forward_and_backward_agree() {
        let list = shifts();
        for point in [-5, 0, 99, 100, 250, 399, 499, 500, 10_000] {
            let forward = list.find_forward(point, None);
            let backward = list.find_backward(point, None);
            assert_eq!(forward, backward, "point={}", point);
            assert!(list.interval(forward).contains(point));
        }
    }

    #[test]
    fn test_find_forward_uses_hint() {
        let list = shifts();
        let hint = list.find_forward(250, None);
        assert_eq!(list.find_forward(450, Some(hint)), list.find_forward(450, None));
    }

    #[test]
    fn test_past_horizon_sentinel() {
        let list = shifts();
        let index = list.find_forward(Ticks::MAX, None);
        assert_eq!(index, list.past_horizon_index());
        assert!(!list.interval(index).active);
    }

    #[test]
    fn test_find_first_online() {
        let list = shifts();
        let index = list.find_first_online(120, None).unwrap();
        assert_eq!(list.interval(index).start, 200);
        assert!(list.find_first_online(600, None).is_none());
    }

    #[test]
    fn test_has_gap_between() {
        let list = shifts();
        assert!(!list.has_gap_between(10, 90));
        assert!(list.has_gap_between(90, 210));
        assert!(!list.has_gap_between(90, 90));
    }

    #[test]
    fn test_continuously_online() {
        let list = shifts();
        assert!(list.are_points_continuously_online(0, 100));
        assert!(!list.are_points_continuously_online(50, 150));
        assert!(list.are_points_continuously_online(210, 210));
    }

    #[test]
    fn test_end_for_online_duration_skips_offline() {
        let list = shifts();
        assert_eq!(list.end_for_online_duration(50, 40), Some(90));
        assert_eq!(list.end_for_online_duration(50, 100), Some(250));
        assert_eq!(list.end_for_online_duration(450, 100), None);
    }

    #[test]
    fn test_set_state_keeps_invariants() {
        let mut list = shifts();
        list.set_state(50, 250, false).unwrap();
        assert!(list.validate().is_ok());
        assert_eq!(list.online_capacity_between(0, 300), 50 + 50);

        list.set_state(100, 200, true).unwrap();
        assert!(list.validate().is_ok());
        assert_eq!(list.online_capacity_between(0, 300), 50 + 100 + 50);
    }
}
