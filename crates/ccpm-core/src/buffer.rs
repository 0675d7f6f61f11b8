//! Buffer entity: a protective time reserve attached to a chain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TaskId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferKind {
    Project,
    Feeding,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BufferKind::Project => "project",
            BufferKind::Feeding => "feeding",
        };
        write!(f, "{s}")
    }
}

/// Consumption-level classification, a pure function of consumption percentage:
/// `Green` below 33%, `Yellow` in `[33, 67)`, `Red` at or above 67%.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferStatus {
    Green,
    Yellow,
    Red,
}

impl BufferStatus {
    pub fn from_consumption_percentage(pct: f64) -> Self {
        if pct >= 67.0 {
            BufferStatus::Red
        } else if pct >= 33.0 {
            BufferStatus::Yellow
        } else {
            BufferStatus::Green
        }
    }
}

impl std::fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BufferStatus::Green => "green",
            BufferStatus::Yellow => "yellow",
            BufferStatus::Red => "red",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEvent {
    pub date: NaiveDate,
    pub delta: i64,
    pub remaining_after: i64,
    pub reason: Option<String>,
    pub status: BufferStatus,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    #[error("buffer id cannot be empty")]
    EmptyId,
    #[error("buffer name cannot be empty")]
    EmptyName,
    #[error("buffer size cannot be negative, got {0}")]
    NegativeSize(i64),
    #[error("feeding buffers must specify connects_to_task_id")]
    MissingConnection,
    #[error("cannot apply a negative amount ({0}) to a buffer")]
    NegativeAmount(i64),
}

/// A time reserve protecting either the project end date (`Project`) or the
/// critical chain from a feeding chain's delays (`Feeding`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Buffer {
    pub id: String,
    pub name: String,
    pub kind: BufferKind,

    pub size: i64,
    pub original_size: i64,
    pub remaining_size: i64,

    pub connects_to_task_id: Option<TaskId>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub new_start_date: Option<NaiveDate>,
    pub new_end_date: Option<NaiveDate>,

    pub status: BufferStatus,
    pub consumption_history: Vec<ConsumptionEvent>,
}

impl Buffer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        size: i64,
        kind: BufferKind,
    ) -> Result<Self, BufferError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(BufferError::EmptyId);
        }
        if name.trim().is_empty() {
            return Err(BufferError::EmptyName);
        }
        if size < 0 {
            return Err(BufferError::NegativeSize(size));
        }
        Ok(Self {
            id,
            name,
            kind,
            size,
            original_size: size,
            remaining_size: size,
            connects_to_task_id: None,
            start_date: None,
            end_date: None,
            new_start_date: None,
            new_end_date: None,
            status: BufferStatus::Green,
            consumption_history: Vec::new(),
        })
    }

    pub fn connect_to(mut self, task_id: impl Into<TaskId>) -> Self {
        self.connects_to_task_id = Some(task_id.into());
        self
    }

    pub fn validate_connection(&self) -> Result<(), BufferError> {
        if self.kind == BufferKind::Feeding && self.connects_to_task_id.is_none() {
            return Err(BufferError::MissingConnection);
        }
        Ok(())
    }

    pub fn consumption_percentage(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.size - self.remaining_size) as f64 / self.size as f64 * 100.0
    }

    /// Consume part of the buffer, clamped so `remaining_size` never drops
    /// below zero. Returns the amount actually consumed.
    pub fn consume(
        &mut self,
        amount: i64,
        status_date: NaiveDate,
        reason: Option<String>,
    ) -> Result<i64, BufferError> {
        if amount < 0 {
            return Err(BufferError::NegativeAmount(amount));
        }
        let new_remaining = (self.remaining_size - amount).max(0);
        let consumed = self.remaining_size - new_remaining;
        self.remaining_size = new_remaining;
        self.status = BufferStatus::from_consumption_percentage(self.consumption_percentage());
        self.consumption_history.push(ConsumptionEvent {
            date: status_date,
            delta: consumed,
            remaining_after: self.remaining_size,
            reason,
            status: self.status,
        });
        Ok(consumed)
    }

    /// Idempotently set total consumption against `size` to `delay_days`
    /// (clamped to `[0, size]`), as used by `updateBufferConsumption`: each
    /// call recomputes `remaining = size - delay` rather than accumulating.
    pub fn set_total_consumption(
        &mut self,
        delay_days: i64,
        status_date: NaiveDate,
        reason: Option<String>,
    ) {
        let clamped_delay = delay_days.clamp(0, self.size);
        let new_remaining = self.size - clamped_delay;
        if new_remaining == self.remaining_size {
            return;
        }
        let delta = self.remaining_size - new_remaining;
        self.remaining_size = new_remaining;
        self.status = BufferStatus::from_consumption_percentage(self.consumption_percentage());
        self.consumption_history.push(ConsumptionEvent {
            date: status_date,
            delta,
            remaining_after: self.remaining_size,
            reason,
            status: self.status,
        });
    }

    pub fn add(&mut self, amount: i64, status_date: NaiveDate, reason: Option<String>) -> i64 {
        self.size += amount;
        self.remaining_size += amount;
        self.status = BufferStatus::from_consumption_percentage(self.consumption_percentage());
        self.consumption_history.push(ConsumptionEvent {
            date: status_date,
            delta: -amount,
            remaining_after: self.remaining_size,
            reason,
            status: self.status,
        });
        self.size
    }

    pub fn reset(&mut self, status_date: NaiveDate, reason: Option<String>) -> i64 {
        let restored = self.size - self.remaining_size;
        self.remaining_size = self.size;
        self.status = BufferStatus::Green;
        self.consumption_history.push(ConsumptionEvent {
            date: status_date,
            delta: -restored,
            remaining_after: self.remaining_size,
            reason,
            status: self.status,
        });
        restored
    }

    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Buffer serializes infallibly")
    }

    pub fn from_dict(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(d as i64)
    }

    #[test]
    fn new_rejects_negative_size() {
        assert_eq!(
            Buffer::new("pb", "Project Buffer", -1, BufferKind::Project).unwrap_err(),
            BufferError::NegativeSize(-1)
        );
    }

    #[test]
    fn feeding_buffer_requires_connection() {
        let b = Buffer::new("fb1", "Feeding Buffer 1", 5, BufferKind::Feeding).unwrap();
        assert_eq!(b.validate_connection().unwrap_err(), BufferError::MissingConnection);
        let b = b.connect_to("t1");
        assert!(b.validate_connection().is_ok());
    }

    #[test]
    fn consume_clamps_to_zero_and_reports_consumed_amount() {
        let mut b = Buffer::new("pb", "Project Buffer", 10, BufferKind::Project).unwrap();
        let consumed = b.consume(15, date(1), None).unwrap();
        assert_eq!(consumed, 10);
        assert_eq!(b.remaining_size, 0);
    }

    #[test]
    fn status_thresholds_match_consumption_percentage() {
        let mut b = Buffer::new("pb", "Project Buffer", 10, BufferKind::Project).unwrap();
        b.set_total_consumption(5, date(1), None);
        assert_eq!(b.status, BufferStatus::Yellow);
        assert_eq!(b.consumption_percentage(), 50.0);

        b.set_total_consumption(8, date(2), None);
        assert_eq!(b.status, BufferStatus::Red);
    }

    #[test]
    fn set_total_consumption_is_idempotent() {
        let mut b = Buffer::new("pb", "Project Buffer", 10, BufferKind::Project).unwrap();
        b.set_total_consumption(5, date(1), None);
        b.set_total_consumption(5, date(2), None);
        assert_eq!(b.remaining_size, 5);
        assert_eq!(b.consumption_history.len(), 1);
    }

    #[test]
    fn green_below_33_percent() {
        let mut b = Buffer::new("pb", "Project Buffer", 10, BufferKind::Project).unwrap();
        b.set_total_consumption(2, date(1), None);
        assert_eq!(b.status, BufferStatus::Green);
    }

    #[test]
    fn to_dict_from_dict_round_trips() {
        let b = Buffer::new("pb", "Project Buffer", 10, BufferKind::Project).unwrap();
        let back = Buffer::from_dict(b.to_dict()).unwrap();
        assert_eq!(back.size, b.size);
    }
}
