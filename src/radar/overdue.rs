//! 联系提醒策略
//!
//! 按距上次联系的时长把好友分为绿/黄/红三档，超过逾期阈值的好友
//! 交给通知模块提醒用户。

use crate::radar::friend::models::Friend;
use serde::Serialize;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// 联系状态颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactColor {
    Green,
    Yellow,
    Red,
}

/// 逾期阈值策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverduePolicy {
    /// 不超过该时长为绿色
    pub fresh_after: Duration,
    /// 不超过该时长为黄色，超过即逾期（红色）
    pub overdue_after: Duration,
}

impl Default for OverduePolicy {
    fn default() -> Self {
        Self {
            fresh_after: DAY * 7,
            overdue_after: DAY * 21,
        }
    }
}

impl OverduePolicy {
    fn elapsed_millis(last_contact: i64, now: i64) -> i64 {
        now.saturating_sub(last_contact)
    }

    pub fn contact_color(&self, last_contact: i64, now: i64) -> ContactColor {
        let elapsed = Self::elapsed_millis(last_contact, now);
        if elapsed <= self.fresh_after.as_millis() as i64 {
            ContactColor::Green
        } else if elapsed <= self.overdue_after.as_millis() as i64 {
            ContactColor::Yellow
        } else {
            ContactColor::Red
        }
    }

    pub fn is_overdue(&self, last_contact: i64, now: i64) -> bool {
        Self::elapsed_millis(last_contact, now) > self.overdue_after.as_millis() as i64
    }

    /// 筛选逾期好友，保持原顺序
    pub fn overdue_friends<'a>(&self, friends: &'a [Friend], now: i64) -> Vec<&'a Friend> {
        friends
            .iter()
            .filter(|f| self.is_overdue(f.last_contact, now))
            .collect()
    }
}

/// 提醒通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub title: String,
    pub body: String,
    /// 同一提醒重复出现时用于去重
    pub tag: String,
}

/// 根据逾期好友生成提醒；一个好友单独提醒，多个好友合并提醒
pub fn reminder_for(overdue: &[&Friend]) -> Option<Reminder> {
    let title = "Time to reach out!".to_string();
    match overdue {
        [] => None,
        [friend] => Some(Reminder {
            title,
            body: format!("You haven't contacted {} in a while.", friend.name),
            tag: format!("overdue-{}", friend.id),
        }),
        many => Some(Reminder {
            title,
            body: format!("{} friends are waiting to hear from you.", many.len()),
            tag: "overdue-multiple".to_string(),
        }),
    }
}

/// 提醒正文
pub fn reminder_text(overdue: &[&Friend]) -> Option<String> {
    reminder_for(overdue).map(|r| r.body)
}
