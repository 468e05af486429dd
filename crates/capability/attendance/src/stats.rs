//! 签到统计（纯函数）。自然日、自然月按场馆时区偏移切分。

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use domain::DAY_MS;
use std::collections::BTreeSet;

/// 周均值统计的回看周数。
pub const AVERAGE_WINDOW_WEEKS: i64 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceStats {
    /// 签到记录总数（同一天多次计多次）。
    pub total_days: u32,
    pub this_month: u32,
    pub today: u32,
    pub average_per_week: u32,
    pub current_streak: u32,
}

/// 由分钟偏移构造时区；越界时退回 UTC。
pub fn facility_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn local_date(ts_ms: i64, offset: &FixedOffset) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.with_timezone(offset).date_naive())
}

pub fn compute_stats(timestamps: &[i64], now_ms: i64, offset: FixedOffset) -> AttendanceStats {
    let Some(today) = local_date(now_ms, &offset) else {
        return AttendanceStats::default();
    };
    let window_start = now_ms - AVERAGE_WINDOW_WEEKS * 7 * DAY_MS;

    let mut stats = AttendanceStats {
        total_days: timestamps.len() as u32,
        ..AttendanceStats::default()
    };
    let mut days = BTreeSet::new();
    let mut recent = 0i64;
    for ts in timestamps {
        let Some(date) = local_date(*ts, &offset) else {
            continue;
        };
        if date == today {
            stats.today += 1;
        }
        if date.year() == today.year() && date.month() == today.month() {
            stats.this_month += 1;
        }
        if *ts >= window_start && *ts <= now_ms {
            recent += 1;
        }
        days.insert(date);
    }
    // 四舍五入
    stats.average_per_week = ((recent + AVERAGE_WINDOW_WEEKS / 2) / AVERAGE_WINDOW_WEEKS) as u32;
    stats.current_streak = streak_from(&days, today);
    stats
}

/// 从今天起向前数连续有签到的自然日；今天没有签到则为 0。
fn streak_from(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut expected = today;
    for date in days.range(..=today).rev() {
        if *date != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(previous) => expected = previous,
            None => break,
        }
    }
    streak
}
