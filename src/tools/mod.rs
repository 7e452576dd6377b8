//! 工具层：注册表、参数校验、调度器与内置工具（link_detect / transcript_fetch / summarize / echo）

pub mod dispatcher;
pub mod echo;
pub mod registry;
pub mod schema;
pub mod summarize;
pub mod youtube;

pub use dispatcher::{DispatchError, Observation, ToolDispatcher};
pub use echo::EchoTool;
pub use registry::{RegistryError, Tool, ToolRegistry, ToolSpec};
pub use schema::validate_args;
pub use summarize::SummarizeTool;
pub use youtube::{
    extract_video_id, LinkDetectTool, TranscriptClient, TranscriptFetchTool, DEFAULT_TIMEDTEXT_URL,
};
