//! 记忆层：token 预算、Master 累积知识、Sub-Agent 工作数据

pub mod knowledge;
pub mod token_budget;

pub use knowledge::{id_like_tokens, reduction_ratio, KnowledgeAccumulator, KnowledgeReport, WorkingData};
pub use token_budget::{KnowledgeBudget, TokenEstimator};
