//! 拓扑构建模块

mod ai_factory_su;

pub use ai_factory_su::{build_ai_factory_su, SuHost, SuTopology, SuTopologyOpts, TopoError};
