//! Jito module - leader schedule predictions and tip accounts.

pub mod leader_schedule;

pub use leader_schedule::{
    BatchLeaderSchedule, JitoLeaderSchedule, LeaderPeriod, LeaderSchedule, LeaderScheduleError, LeaderSource,
    NextLeaderSlot, RealtimeLeaderSchedule, SlotClock,
};
