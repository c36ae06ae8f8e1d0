mod buffer;
mod transfer;
mod upgrade;

pub use buffer::propose_close_buffer;
pub use transfer::propose_transfer;
pub use upgrade::{plan_and_submit_upgrade, plan_upgrade, ExtendPolicy, UpgradeRequest};
