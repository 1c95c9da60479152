pub mod ranked;

pub use ranked::{Escalation, RankPolicy, RankedQueue, Removal};
