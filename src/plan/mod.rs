//! 规划层：计划数据模型、模型输出解析、计划生成与校验

pub mod generator;
pub mod parse;
pub mod types;

pub use generator::{validate_plan, PlanError, PlanGenerator, DEFAULT_MAX_STEPS};
pub use parse::{parse_plan_output, plan_schema_json, PlanFormat, PlannedStep};
pub use types::{Plan, Step, StepError, StepStatus};
