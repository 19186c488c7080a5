mod foods;
mod helpers;
mod report;

pub(crate) use foods::cmd_foods;
pub(crate) use report::cmd_report;
