pub mod check;
pub mod commit;
pub mod queue;
pub mod remap;
pub mod renumber;
pub mod repair;
pub mod session;
pub mod task_ops;
