//! Mock Oracle（用于测试与无 API Key 的本地运行）
//!
//! ScriptedOracle 按顺序吐出预置文档或错误，并记录每一次请求，用来注入对抗性输出；
//! MockOracle 始终给出一个不含命令的对话式规划。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{Oracle, OracleError, OracleRequest};

/// 脚本耗尽后按 (请求, 第几次调用) 动态生成文档
pub type Responder = Box<dyn Fn(&OracleRequest, usize) -> Value + Send + Sync>;

/// 脚本化 Oracle：按 FIFO 返回预置结果；脚本耗尽后依次尝试 responder、fallback，最后返回 Api 错误
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Value, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
    fallback: Option<Value>,
    responder: Option<Responder>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 脚本耗尽后每次都返回同一文档（用于「永不完成」的 oracle）
    pub fn with_fallback(mut self, doc: Value) -> Self {
        self.fallback = Some(doc);
        self
    }

    /// 用于「永不完成」且每轮提出新元素的 oracle
    pub fn with_responder(
        mut self,
        responder: impl Fn(&OracleRequest, usize) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn push_ok(&self, doc: Value) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(doc));
        }
    }

    pub fn push_err(&self, err: OracleError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    /// 已收到的请求（按时间顺序）
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        let call_index = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push(request.clone());
                requests.len() - 1
            }
            Err(_) => 0,
        };
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => match &self.responder {
                Some(responder) => Ok(responder(request, call_index)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| OracleError::Api("oracle script exhausted".to_string())),
            },
        }
    }
}

/// 无后端时使用：对任意请求都回答一个空命令列表的对话式规划
#[derive(Debug, Default)]
pub struct MockOracle;

#[async_trait]
impl Oracle for MockOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        Ok(json!({
            "command_list": [],
            "query_type": "chat",
            "cross_account": false,
            "natural_language_response": format!(
                "Mock oracle (no provider configured) received: {}",
                request.user.lines().last().unwrap_or("")
            ),
        }))
    }
}
