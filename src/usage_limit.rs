//! 用量限制检测模块 - 识别 AI CLI 的 usage limit 提示并解析等待时长
//!
//! 解析优先级：
//! 1. `after HH:MM UTC`（绝对时间，取下一次出现的该时刻）
//! 2. `in X hours [Y minutes]`（相对时长，X 必须 >= 1）
//! 3. 默认 3600 秒
//!
//! 结果最多 7 天。

use chrono::{DateTime, Duration, NaiveTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// 无法解析时长时的默认等待（秒）
pub const DEFAULT_WAIT_SECS: u64 = 3600;

/// 等待时长上限（秒）
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 3600;

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(exceeded your usage limit|usage limit.{0,60}try again after|rate limit.{0,60}retry after)",
    )
    .expect("Invalid usage limit regex")
});

static UTC_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)after (\d{1,2}):(\d{1,2}) UTC").expect("Invalid UTC time regex"));

static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)in (\d+) hours?").expect("Invalid hours regex"));

static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+) minutes?").expect("Invalid minutes regex"));

/// 一次用量限制事件（不持久化，检测后立即被 watchdog 消费）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLimitEvent {
    /// 服务端给出的等待时长（秒），不含 resume buffer
    pub wait_seconds: u64,
    /// 解析时间
    pub extracted_at: DateTime<Utc>,
}

impl UsageLimitEvent {
    /// 检测文本，命中时生成事件
    pub fn detect(text: &str) -> Option<Self> {
        Self::detect_at(text, Utc::now())
    }

    /// 以指定的当前时间检测（用于测试）
    pub fn detect_at(text: &str, now: DateTime<Utc>) -> Option<Self> {
        if !has_usage_limit_error(text) {
            return None;
        }
        Some(Self {
            wait_seconds: extract_wait_seconds_at(text, now),
            extracted_at: now,
        })
    }
}

/// 文本中是否包含 usage limit 提示（大小写不敏感）
pub fn has_usage_limit_error(text: &str) -> bool {
    LIMIT_RE.is_match(text)
}

/// 解析需要等待的秒数，始终返回正数
pub fn extract_wait_seconds(text: &str) -> u64 {
    extract_wait_seconds_at(text, Utc::now())
}

/// 以指定的当前时间解析等待秒数
pub fn extract_wait_seconds_at(text: &str, now: DateTime<Utc>) -> u64 {
    seconds_until_utc_time(text, now)
        .or_else(|| relative_duration_secs(text))
        .unwrap_or(DEFAULT_WAIT_SECS)
        .min(MAX_WAIT_SECS)
}

/// "after HH:MM UTC" → 距离下一次该时刻的秒数
fn seconds_until_utc_time(text: &str, now: DateTime<Utc>) -> Option<u64> {
    let caps = UTC_TIME_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;

    let mut target = now.date_naive().and_time(time).and_utc();
    if target <= now {
        // 今天的这个时刻已经过了，取明天
        target += Duration::days(1);
    }

    let secs = (target - now).num_seconds();
    (secs > 0).then_some(secs as u64)
}

/// "in X hours [Y minutes]"，X 为 0 时视为未指定
fn relative_duration_secs(text: &str) -> Option<u64> {
    let caps = HOURS_RE.captures(text)?;
    let hours: u64 = caps[1].parse().ok()?;
    if hours == 0 {
        return None;
    }

    let rest = &text[caps.get(0)?.end()..];
    let minutes: u64 = MINUTES_RE
        .captures(rest)
        .and_then(|m| m[1].parse().ok())
        .unwrap_or(0);

    hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_detects_all_trigger_phrases() {
        assert!(has_usage_limit_error("You have exceeded your usage limit for today."));
        assert!(has_usage_limit_error("API usage limits reached, try again after 14:00 UTC"));
        assert!(has_usage_limit_error("Rate limit exceeded, retry after 1 hour"));
        assert!(has_usage_limit_error("EXCEEDED YOUR USAGE LIMIT"));
    }

    #[test]
    fn test_ignores_unrelated_text() {
        assert!(!has_usage_limit_error(""));
        assert!(!has_usage_limit_error("Everything is fine, carry on."));
        assert!(!has_usage_limit_error("usage limit info: see docs"));
    }

    #[test]
    fn test_phrase_distance_is_bounded() {
        let far = format!("usage limit {} try again after 10:00 UTC", "x".repeat(80));
        assert!(!has_usage_limit_error(&far));

        let near = format!("usage limit {} try again after 10:00 UTC", "x".repeat(30));
        assert!(has_usage_limit_error(&near));
    }

    #[test]
    fn test_phrases_do_not_span_lines() {
        assert!(!has_usage_limit_error("rate limit\nretry after 5 minutes"));
    }

    #[test]
    fn test_utc_time_later_today() {
        let now = at(10, 0, 0);
        assert_eq!(extract_wait_seconds_at("try again after 12:30 UTC", now), 2 * 3600 + 1800);
    }

    #[test]
    fn test_utc_time_already_passed_rolls_to_tomorrow() {
        let now = at(15, 0, 0);
        assert_eq!(extract_wait_seconds_at("try again after 14:00 UTC", now), 23 * 3600);
    }

    #[test]
    fn test_utc_time_equal_to_now_rolls_to_tomorrow() {
        let now = at(14, 0, 0);
        assert_eq!(extract_wait_seconds_at("after 14:00 UTC", now), 24 * 3600);
    }

    #[test]
    fn test_utc_time_floors_partial_seconds() {
        let now = at(13, 59, 30) + Duration::milliseconds(400);
        assert_eq!(extract_wait_seconds_at("after 14:00 UTC", now), 29);
    }

    #[test]
    fn test_invalid_utc_time_falls_through() {
        let now = at(10, 0, 0);
        assert_eq!(extract_wait_seconds_at("after 27:90 UTC, in 2 hours", now), 7200);
        assert_eq!(extract_wait_seconds_at("after 27:90 UTC", now), DEFAULT_WAIT_SECS);
    }

    #[test]
    fn test_utc_takes_priority_over_relative() {
        let now = at(10, 0, 0);
        assert_eq!(extract_wait_seconds_at("in 5 hours, i.e. after 11:00 UTC", now), 3600);
    }

    #[test]
    fn test_relative_hours_and_minutes() {
        assert_eq!(extract_wait_seconds("in 2 hours"), 7200);
        assert_eq!(extract_wait_seconds("in 1 hours 30 minutes"), 5400);
        assert_eq!(extract_wait_seconds("try again in 1 hour 1 minute"), 3660);
    }

    #[test]
    fn test_minutes_before_hours_are_not_added() {
        assert_eq!(extract_wait_seconds("waited 10 minutes, try again in 2 hours"), 7200);
    }

    #[test]
    fn test_zero_hours_falls_back_to_default() {
        assert_eq!(extract_wait_seconds("in 0 hours 45 minutes"), DEFAULT_WAIT_SECS);
    }

    #[test]
    fn test_fallback_default() {
        assert_eq!(extract_wait_seconds("no duration here"), DEFAULT_WAIT_SECS);
        assert_eq!(extract_wait_seconds("exceeded your usage limit"), DEFAULT_WAIT_SECS);
        assert_eq!(extract_wait_seconds(""), DEFAULT_WAIT_SECS);
    }

    #[test]
    fn test_overflowing_hours_falls_back() {
        assert_eq!(extract_wait_seconds("in 99999999999999999999 hours"), DEFAULT_WAIT_SECS);
    }

    #[test]
    fn test_single_digit_minutes() {
        let now = at(9, 0, 0);
        assert_eq!(extract_wait_seconds_at("try again after 9:5 UTC", now), 300);
    }

    #[test]
    fn test_huge_hours_capped() {
        assert_eq!(extract_wait_seconds("in 200 hours"), MAX_WAIT_SECS);
        assert_eq!(extract_wait_seconds("in 2562047788015216 hours"), MAX_WAIT_SECS);
    }

    #[test]
    fn test_event_detect() {
        let now = at(10, 0, 0);
        let event = UsageLimitEvent::detect_at("You have exceeded your usage limit. Try in 3 hours", now)
            .unwrap();
        assert_eq!(event.wait_seconds, 3 * 3600);
        assert_eq!(event.extracted_at, now);

        assert!(UsageLimitEvent::detect_at("in 3 hours", now).is_none());
    }
}
