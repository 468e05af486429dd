//! 会员状态解析（纯函数）。

use domain::DAY_MS;

/// 进入"即将到期"提示的剩余天数阈值。
pub const EXPIRING_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Active,
    Expired,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Expired => "expired",
        }
    }
}

/// 解析结果。`days_remaining = None` 表示无到期日（老账户，永久有效）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipState {
    pub status: MembershipStatus,
    pub days_remaining: Option<i64>,
    pub membership_end_ms: Option<i64>,
}

impl MembershipState {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    pub fn expiring_soon(&self) -> bool {
        self.is_active()
            && self
                .days_remaining
                .is_some_and(|days| days <= EXPIRING_SOON_DAYS)
    }
}

/// 根据到期时间与显式状态标记解析会员状态。
///
/// 剩余天数向上取整并截断到 0；显式 `active` 标记与日期推导结果取"或"。
pub fn resolve(
    end_ms: Option<i64>,
    explicit_status: Option<&str>,
    now_ms: i64,
) -> MembershipState {
    let Some(end_ms) = end_ms else {
        return MembershipState {
            status: MembershipStatus::Active,
            days_remaining: None,
            membership_end_ms: None,
        };
    };
    let days_remaining = ceil_days(end_ms - now_ms).max(0);
    let flagged_active = explicit_status
        .map(|flag| flag.trim().eq_ignore_ascii_case("active"))
        .unwrap_or(false);
    let status = if days_remaining > 0 || flagged_active {
        MembershipStatus::Active
    } else {
        MembershipStatus::Expired
    };
    MembershipState {
        status,
        days_remaining: Some(days_remaining),
        membership_end_ms: Some(end_ms),
    }
}

fn ceil_days(delta_ms: i64) -> i64 {
    delta_ms.div_euclid(DAY_MS) + i64::from(delta_ms.rem_euclid(DAY_MS) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn past_end_date_is_expired_with_zero_days() {
        for days_ago in [1, 2, 30, 365] {
            let state = resolve(Some(NOW - days_ago * DAY_MS), None, NOW);
            assert_eq!(state.status, MembershipStatus::Expired);
            assert_eq!(state.days_remaining, Some(0));
        }
        let just_past = resolve(Some(NOW - 1), None, NOW);
        assert_eq!(just_past.days_remaining, Some(0));
    }

    #[test]
    fn tomorrow_is_one_day() {
        let state = resolve(Some(NOW + DAY_MS), None, NOW);
        assert_eq!(state.days_remaining, Some(1));
        assert!(state.is_active());
    }

    #[test]
    fn partial_day_rounds_up() {
        let state = resolve(Some(NOW + DAY_MS + 1), None, NOW);
        assert_eq!(state.days_remaining, Some(2));
        let state = resolve(Some(NOW + 1), None, NOW);
        assert_eq!(state.days_remaining, Some(1));
    }

    #[test]
    fn missing_end_date_is_active() {
        let state = resolve(None, Some("expired"), NOW);
        assert!(state.is_active());
        assert_eq!(state.days_remaining, None);
        assert!(!state.expiring_soon());
    }

    #[test]
    fn explicit_flag_overrides_expired_date() {
        let state = resolve(Some(NOW - DAY_MS), Some("Active"), NOW);
        assert!(state.is_active());
        assert_eq!(state.days_remaining, Some(0));
    }

    #[test]
    fn expiring_soon_threshold() {
        assert!(resolve(Some(NOW + 7 * DAY_MS), None, NOW).expiring_soon());
        assert!(!resolve(Some(NOW + 8 * DAY_MS), None, NOW).expiring_soon());
    }
}
