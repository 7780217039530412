//! Token 预算控制
//!
//! 累积知识与工作数据每轮都被完整替换，预算只用于判断是否超限并记录告警；
//! 引擎不会截断知识，以免丢掉后续步骤仍需要的事实。

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 知识缓冲区的 token 上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeBudget {
    max_tokens: usize,
}

impl KnowledgeBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// 返回 (估算 token 数, 是否超限)
    pub fn check(&self, text: &str) -> (usize, bool) {
        let tokens = TokenEstimator::estimate(text);
        (tokens, tokens > self.max_tokens)
    }
}

impl Default for KnowledgeBudget {
    fn default() -> Self {
        Self::new(1500)
    }
}
